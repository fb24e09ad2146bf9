//! FormEngine: runs one form step per user turn.
//!
//! The engine looks up the conversation's session, feeds the input through
//! the pure `transition` function, persists the result and then performs the
//! effects (prompts, summary, notices, submission) against an `Outbox`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::channels::{Outbox, UserInput};
use crate::error::{Error, FormError};

use super::definition::FormDefinition;
use super::prompts;
use super::session::{FormSession, FormValues, SessionStore};
use super::state::FormState;
use super::transition::{self, Effect, Rejection};

/// Called once with every collected value after the user confirms.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_complete(
        &self,
        conversation_id: &str,
        values: &FormValues,
        outbox: &dyn Outbox,
    ) -> Result<(), Error>;
}

/// What happened to a user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// The conversation has no active form.
    NoActiveForm,
    /// The input was rejected and the user re-prompted.
    Rejected(Rejection),
    /// The session moved to a new live state.
    Advanced(FormState),
    /// The user confirmed and the completion handler ran.
    Completed,
    Cancelled,
}

struct RegisteredForm {
    definition: FormDefinition,
    handler: Arc<dyn CompletionHandler>,
}

/// Drives registered forms for every conversation.
pub struct FormEngine {
    forms: HashMap<String, RegisteredForm>,
    sessions: Arc<SessionStore>,
}

impl FormEngine {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self {
            forms: HashMap::new(),
            sessions,
        }
    }

    /// Register a form and its completion handler under the form's name.
    pub fn register(&mut self, definition: FormDefinition, handler: Arc<dyn CompletionHandler>) {
        let name = definition.name().to_string();
        if self.forms.contains_key(&name) {
            warn!(form = %name, "Replacing previously registered form");
        }
        self.forms.insert(
            name,
            RegisteredForm {
                definition,
                handler,
            },
        );
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub async fn is_active(&self, session_key: &str) -> bool {
        self.sessions.contains(session_key).await
    }

    /// Start `form_name` in a one-to-one conversation.
    ///
    /// Fails with `FormError::Conflict` when the conversation already has an
    /// active form; that session is left untouched.
    pub async fn enter_form(
        &self,
        form_name: &str,
        conversation_id: &str,
        outbox: &dyn Outbox,
    ) -> Result<(), Error> {
        self.enter_form_in(form_name, conversation_id, conversation_id, outbox)
            .await
    }

    /// Start `form_name` under `session_key`, sending its messages to
    /// `chat_id`. Group members each get their own key within one chat.
    pub async fn enter_form_in(
        &self,
        form_name: &str,
        session_key: &str,
        chat_id: &str,
        outbox: &dyn Outbox,
    ) -> Result<(), Error> {
        let form = self
            .forms
            .get(form_name)
            .ok_or_else(|| FormError::UnknownForm(form_name.to_string()))?;

        let entry = transition::enter();
        let mut session = FormSession::new(form_name, session_key).replying_to(chat_id);
        session.state = entry.next;

        self.sessions
            .insert_new(session.clone())
            .await
            .map_err(|active| FormError::Conflict {
                conversation_id: session_key.to_string(),
                form: active,
            })?;

        info!(form = form_name, session_key, chat_id, "Form started");

        for effect in entry.effects {
            self.apply(effect, form, &session, outbox).await?;
        }
        Ok(())
    }

    /// Apply one user input to the active form stored under `session_key`.
    pub async fn on_user_input(
        &self,
        session_key: &str,
        input: &UserInput,
        outbox: &dyn Outbox,
    ) -> Result<InputOutcome, Error> {
        let Some(mut session) = self.sessions.get(session_key).await else {
            return Ok(InputOutcome::NoActiveForm);
        };

        let Some(form) = self.forms.get(&session.form_name) else {
            self.sessions.remove(session_key).await;
            return Err(FormError::UnknownForm(session.form_name).into());
        };

        let step = match transition::transition(&form.definition, session.state, input) {
            Ok(step) => step,
            Err(Rejection::Closed) => {
                self.sessions.remove(session_key).await;
                return Ok(InputOutcome::NoActiveForm);
            }
            Err(rejection) => {
                debug!(session_key, state = %session.state, ?rejection, "Input rejected");
                if let Some(reply) = rejection.reply(&session.reply_to) {
                    outbox.send(reply).await?;
                }
                return Ok(InputOutcome::Rejected(rejection));
            }
        };

        debug_assert!(
            session
                .state
                .can_transition_to(step.next, form.definition.len()),
            "illegal form transition {} -> {}",
            session.state,
            step.next
        );

        if let Some((key, value)) = step.store {
            session.values.insert(key, value);
        }
        session.state = step.next;

        if step.next.is_terminal() {
            self.sessions.remove(session_key).await;
        } else {
            self.sessions.update(session.clone()).await;
        }

        for effect in step.effects {
            self.apply(effect, form, &session, outbox).await?;
        }

        Ok(match step.next {
            FormState::Completed => {
                info!(form = %session.form_name, session_key, "Form completed");
                InputOutcome::Completed
            }
            FormState::Cancelled => {
                info!(form = %session.form_name, session_key, "Form cancelled");
                InputOutcome::Cancelled
            }
            live => InputOutcome::Advanced(live),
        })
    }

    /// Drop the session without messaging the user.
    pub async fn cancel(&self, session_key: &str) -> bool {
        self.sessions.remove(session_key).await.is_some()
    }

    async fn apply(
        &self,
        effect: Effect,
        form: &RegisteredForm,
        session: &FormSession,
        outbox: &dyn Outbox,
    ) -> Result<(), Error> {
        let conversation_id = session.reply_to.as_str();
        let message = match effect {
            Effect::CancelHint => prompts::cancel_hint(conversation_id),
            Effect::Prompt(index) => {
                let Some(field) = form.definition.field(index) else {
                    return Ok(());
                };
                prompts::field_prompt(conversation_id, field)
            }
            Effect::Summary => prompts::summary(conversation_id, &form.definition, &session.values),
            Effect::CancelNotice => prompts::cancelled_notice(conversation_id),
            Effect::Submit => {
                return form
                    .handler
                    .on_complete(conversation_id, &session.values, outbox)
                    .await;
            }
        };
        outbox.send(message).await?;
        Ok(())
    }
}
