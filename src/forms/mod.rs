//! Guided multi-turn forms.
//!
//! A form is a fixed list of fields asked one per turn, followed by a
//! confirmation summary. Between turns the progress lives in the
//! `SessionStore`, keyed by conversation.

pub mod definition;
pub mod engine;
pub mod prompts;
pub mod session;
pub mod state;
pub mod transition;

pub use definition::{FieldKind, FieldOption, FieldSpec, FormDefinition};
pub use engine::{CompletionHandler, FormEngine, InputOutcome};
pub use session::{FormSession, FormValues, SessionStore, spawn_expiry_task};
pub use state::FormState;
pub use transition::{Effect, Rejection, Transition};
