//! Dispatcher: routes transport events to per-conversation workers.
//!
//! Each conversation gets its own task fed by an unbounded queue, so one
//! conversation's events are handled strictly in arrival order while
//! different conversations proceed concurrently. In group chats the
//! conversation is one member's session within the chat. The rate limiter is
//! consulted here, at arrival, and its verdict travels with the event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::{EventStream, IncomingEvent, Outbox, OutgoingMessage};
use crate::commands::{self, Command, REGISTER_FORM};
use crate::config::{LinkConfig, RateLimitConfig, SessionConfig};
use crate::error::{Error, FormError};
use crate::forms::{FormEngine, InputOutcome, prompts};
use crate::ratelimit::{RateLimiter, Verdict};

struct Job {
    event: IncomingEvent,
    verdict: Verdict,
}

struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    handle: JoinHandle<()>,
}

/// State shared by every conversation worker.
struct Router {
    engine: Arc<FormEngine>,
    outbox: Arc<dyn Outbox>,
    links: LinkConfig,
}

pub struct Dispatcher {
    router: Arc<Router>,
    limiter: RateLimiter,
    workers: HashMap<String, Worker>,
    worker_idle: Duration,
    sweep_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<FormEngine>,
        outbox: Arc<dyn Outbox>,
        links: LinkConfig,
        rate_limit: RateLimitConfig,
        session: SessionConfig,
    ) -> Self {
        Self {
            router: Arc::new(Router {
                engine,
                outbox,
                links,
            }),
            limiter: RateLimiter::new(rate_limit),
            workers: HashMap::new(),
            worker_idle: session.worker_idle,
            sweep_interval: session.sweep_interval,
        }
    }

    /// Queue one event on its conversation's worker, starting one if needed.
    pub fn dispatch(&mut self, event: IncomingEvent) {
        let verdict = self
            .limiter
            .check(event.user_id.as_deref(), event.chat_kind, Instant::now());
        let session_key = event.session_key();
        let mut job = Job { event, verdict };

        let mut previous = None;
        if let Some(worker) = self.workers.remove(&session_key) {
            match worker.tx.send(job) {
                Ok(()) => {
                    self.workers.insert(session_key, worker);
                    return;
                }
                // The worker went idle and closed its queue. It may still be
                // draining, so its successor waits for it.
                Err(mpsc::error::SendError(returned)) => {
                    job = returned;
                    previous = Some(worker.handle);
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(job);
        let handle = tokio::spawn(run_worker(
            Arc::clone(&self.router),
            rx,
            self.worker_idle,
            previous,
        ));
        debug!(session_key = %session_key, "Conversation worker started");
        self.workers.insert(session_key, Worker { tx, handle });
    }

    /// Dispatch every event of `events` until the stream ends, then wait for
    /// queued work to finish.
    pub async fn run(mut self, mut events: EventStream) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.tick().await;

        loop {
            tokio::select! {
                next = events.next() => match next {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        info!("Event stream ended, draining conversation workers");
        self.drain().await;
    }

    /// Forget idle workers and stale rate-limit entries.
    pub fn sweep(&mut self) {
        let pruned = self.limiter.prune(Instant::now());
        let before = self.workers.len();
        self.workers
            .retain(|_, worker| !(worker.tx.is_closed() && worker.handle.is_finished()));
        debug!(
            rate_limit_entries = pruned,
            workers = before - self.workers.len(),
            "Dispatcher sweep"
        );
    }

    /// Stop accepting events and wait for every worker to finish its queue.
    pub async fn drain(self) {
        for (session_key, worker) in self.workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                error!(session_key = %session_key, error = %e, "Conversation worker panicked");
            }
        }
    }
}

async fn run_worker(
    router: Arc<Router>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    idle: Duration,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous
        && let Err(e) = previous.await
    {
        error!(error = %e, "Previous conversation worker panicked");
    }

    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(job)) => router.handle(job).await,
            Ok(None) => return,
            Err(_) => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    router.handle(job).await;
                }
                return;
            }
        }
    }
}

impl Router {
    async fn handle(&self, job: Job) {
        let Job { event, verdict } = job;

        if let Verdict::Throttled { penalty } = verdict {
            self.deliver(commands::throttled_notice(&event.conversation_id))
                .await;
            tokio::time::sleep(penalty).await;
        }

        if let Err(e) = self.route(&event).await {
            self.report(&event, e).await;
        }
    }

    async fn route(&self, event: &IncomingEvent) -> Result<(), Error> {
        let conversation_id = event.conversation_id.as_str();
        let session_key = event.session_key();
        let outbox = self.outbox.as_ref();

        match Command::parse(&event.input) {
            Some(Command::Start) => {
                outbox
                    .send(commands::welcome(conversation_id, &self.links))
                    .await?;
            }
            Some(Command::Help) => {
                outbox
                    .send(commands::help(conversation_id, &self.links))
                    .await?;
            }
            Some(Command::Register) => {
                self.engine
                    .enter_form_in(REGISTER_FORM, &session_key, conversation_id, outbox)
                    .await?;
            }
            None => {
                let outcome = self
                    .engine
                    .on_user_input(&session_key, &event.input, outbox)
                    .await?;
                if outcome == InputOutcome::NoActiveForm {
                    debug!(session_key = %session_key, "Ignoring input outside of a form");
                }
            }
        }
        Ok(())
    }

    async fn report(&self, event: &IncomingEvent, err: Error) {
        let conversation_id = event.conversation_id.as_str();
        match err {
            Error::Form(FormError::Conflict { form, .. }) => {
                debug!(conversation_id, form = %form, "Form already active");
                self.deliver(prompts::already_active(conversation_id)).await;
            }
            other => {
                error!(conversation_id, error = %other, "Unexpected error handling event");
                if self.engine.cancel(&event.session_key()).await {
                    info!(conversation_id, "Active form discarded after error");
                }
                if event.chat_kind.is_private() {
                    self.deliver(commands::apology(conversation_id)).await;
                }
            }
        }
    }

    async fn deliver(&self, message: OutgoingMessage) {
        let conversation_id = message.conversation_id.clone();
        if let Err(e) = self.outbox.send(message).await {
            warn!(conversation_id = %conversation_id, error = %e, "Failed to deliver notice");
        }
    }
}
