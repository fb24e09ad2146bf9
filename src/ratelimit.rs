//! Per-user cooldown for one-to-one conversations.
//!
//! Interactions closer together than the window are throttled: the caller
//! tells the user to slow down and pauses that conversation for the penalty.
//! Group chats are never throttled.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::channels::ChatKind;
use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Throttled { penalty: Duration },
}

impl Verdict {
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

/// Last accepted interaction per user, bounded by `capacity`.
pub struct RateLimiter {
    config: RateLimitConfig,
    last_seen: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last_seen: HashMap::new(),
        }
    }

    /// Judge one interaction arriving at `now`.
    ///
    /// Only accepted interactions refresh the user's timestamp.
    pub fn check(&mut self, user_id: Option<&str>, chat_kind: ChatKind, now: Instant) -> Verdict {
        let Some(user_id) = user_id else {
            return Verdict::Pass;
        };
        if !chat_kind.is_private() {
            return Verdict::Pass;
        }

        if let Some(last) = self.last_seen.get(user_id)
            && now.saturating_duration_since(*last) < self.config.window
        {
            debug!(user_id, "Interaction throttled");
            return Verdict::Throttled {
                penalty: self.config.penalty,
            };
        }

        if !self.last_seen.contains_key(user_id) && self.last_seen.len() >= self.config.capacity {
            self.make_room(now);
        }
        self.last_seen.insert(user_id.to_string(), now);
        Verdict::Pass
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub fn prune(&mut self, now: Instant) -> usize {
        let before = self.last_seen.len();
        let window = self.config.window;
        self.last_seen
            .retain(|_, last| now.saturating_duration_since(*last) < window);
        before - self.last_seen.len()
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    fn make_room(&mut self, now: Instant) {
        if self.prune(now) > 0 {
            return;
        }
        let oldest = self
            .last_seen
            .iter()
            .min_by_key(|(_, last)| **last)
            .map(|(user, _)| user.clone());
        if let Some(user) = oldest {
            self.last_seen.remove(&user);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn first_interaction_passes() {
        let mut limiter = limiter();
        assert_eq!(
            limiter.check(Some("u1"), ChatKind::Private, Instant::now()),
            Verdict::Pass
        );
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn fast_second_interaction_is_throttled() {
        let mut limiter = limiter();
        let t0 = Instant::now();
        limiter.check(Some("u1"), ChatKind::Private, t0);

        let verdict = limiter.check(Some("u1"), ChatKind::Private, t0 + Duration::from_millis(100));
        assert_eq!(
            verdict,
            Verdict::Throttled {
                penalty: Duration::from_secs(4)
            }
        );
    }

    #[test]
    fn throttled_interaction_does_not_refresh_timestamp() {
        let mut limiter = limiter();
        let t0 = Instant::now();
        limiter.check(Some("u1"), ChatKind::Private, t0);
        limiter.check(Some("u1"), ChatKind::Private, t0 + Duration::from_millis(400));

        // 600 ms after the accepted one, 200 ms after the throttled one.
        let verdict = limiter.check(Some("u1"), ChatKind::Private, t0 + Duration::from_millis(600));
        assert_eq!(verdict, Verdict::Pass);
    }

    #[test]
    fn group_chats_are_never_throttled() {
        let mut limiter = limiter();
        let t0 = Instant::now();
        for kind in [ChatKind::Group, ChatKind::Supergroup, ChatKind::Channel] {
            for i in 0..3 {
                let verdict = limiter.check(Some("u1"), kind, t0 + Duration::from_millis(i));
                assert_eq!(verdict, Verdict::Pass);
            }
        }
        assert!(limiter.is_empty());
    }

    #[test]
    fn anonymous_interactions_pass() {
        let mut limiter = limiter();
        let t0 = Instant::now();
        assert_eq!(limiter.check(None, ChatKind::Private, t0), Verdict::Pass);
        assert_eq!(limiter.check(None, ChatKind::Private, t0), Verdict::Pass);
    }

    #[test]
    fn users_are_tracked_independently() {
        let mut limiter = limiter();
        let t0 = Instant::now();
        limiter.check(Some("u1"), ChatKind::Private, t0);
        assert_eq!(
            limiter.check(Some("u2"), ChatKind::Private, t0 + Duration::from_millis(10)),
            Verdict::Pass
        );
    }

    #[test]
    fn cache_stays_bounded() {
        let mut limiter = RateLimiter::new(RateLimitConfig {
            capacity: 3,
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        for i in 0..10u64 {
            limiter.check(Some(&format!("u{i}")), ChatKind::Private, t0 + Duration::from_millis(i));
        }
        assert_eq!(limiter.len(), 3);
        // The most recent user survived eviction and is still cooling down.
        assert!(
            limiter
                .check(Some("u9"), ChatKind::Private, t0 + Duration::from_millis(20))
                .is_throttled()
        );
    }

    #[test]
    fn overflow_evicts_stale_entries_first() {
        let mut limiter = RateLimiter::new(RateLimitConfig {
            capacity: 2,
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        limiter.check(Some("old"), ChatKind::Private, t0);
        limiter.check(Some("recent"), ChatKind::Private, t0 + Duration::from_millis(900));
        limiter.check(Some("new"), ChatKind::Private, t0 + Duration::from_millis(1000));

        assert_eq!(limiter.len(), 2);
        assert!(
            limiter
                .check(Some("recent"), ChatKind::Private, t0 + Duration::from_millis(1100))
                .is_throttled()
        );
    }

    #[test]
    fn prune_drops_expired_entries() {
        let mut limiter = limiter();
        let t0 = Instant::now();
        limiter.check(Some("u1"), ChatKind::Private, t0);
        limiter.check(Some("u2"), ChatKind::Private, t0 + Duration::from_millis(400));
        assert_eq!(limiter.prune(t0 + Duration::from_millis(600)), 1);
        assert_eq!(limiter.len(), 1);
    }
}
