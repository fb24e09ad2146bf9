//! Session store: in-memory per-conversation form sessions with idle expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::state::FormState;

/// Collected answers, kept in the order the fields were completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormValues(Vec<(String, String)>);

impl FormValues {
    /// Insert or replace the value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One user's progress through a form.
#[derive(Debug, Clone)]
pub struct FormSession {
    pub form_name: String,
    /// Store key: the chat id in one-to-one chats, `chat:user` in groups.
    pub session_key: String,
    /// Chat the form's messages are sent to.
    pub reply_to: String,
    pub values: FormValues,
    pub state: FormState,
    pub last_activity: Instant,
}

impl FormSession {
    /// A session that replies to the chat it is keyed by.
    pub fn new(form_name: impl Into<String>, session_key: impl Into<String>) -> Self {
        let session_key = session_key.into();
        Self {
            form_name: form_name.into(),
            reply_to: session_key.clone(),
            session_key,
            values: FormValues::default(),
            state: FormState::initial(),
            last_activity: Instant::now(),
        }
    }

    pub fn replying_to(mut self, chat_id: impl Into<String>) -> Self {
        self.reply_to = chat_id.into();
        self
    }

    fn is_expired(&self, idle_ttl: Duration) -> bool {
        self.last_activity.elapsed() > idle_ttl
    }
}

/// At most one session per session key.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, FormSession>>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
        })
    }

    /// Store a fresh session. Fails with the active session's form name if the
    /// conversation already has one.
    pub async fn insert_new(&self, session: FormSession) -> Result<(), String> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&session.session_key)
            && !existing.is_expired(self.idle_ttl)
        {
            return Err(existing.form_name.clone());
        }
        sessions.insert(session.session_key.clone(), session);
        Ok(())
    }

    /// Snapshot of the conversation's session. Expired sessions are dropped.
    pub async fn get(&self, session_key: &str) -> Option<FormSession> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_key) {
                Some(s) if !s.is_expired(self.idle_ttl) => return Some(s.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions
            .get(session_key)
            .is_some_and(|s| s.is_expired(self.idle_ttl))
        {
            sessions.remove(session_key);
            debug!(session_key, "Form session expired on access");
        }
        None
    }

    /// Write back a session after a step and refresh its idle timer.
    pub async fn update(&self, mut session: FormSession) {
        session.last_activity = Instant::now();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_key.clone(), session);
    }

    pub async fn remove(&self, session_key: &str) -> Option<FormSession> {
        self.sessions.write().await.remove(session_key)
    }

    pub async fn contains(&self, session_key: &str) -> bool {
        self.get(session_key).await.is_some()
    }

    /// Drop every idle session. Returns the number removed.
    pub async fn expire_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.idle_ttl));
        let expired = before - sessions.len();
        if expired > 0 {
            info!(count = expired, "Expired idle form sessions");
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Spawn a background task that periodically expires idle sessions.
pub fn spawn_expiry_task(store: Arc<SessionStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            store.expire_idle().await;
        }
    })
}
