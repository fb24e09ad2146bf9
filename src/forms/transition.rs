//! Pure transition function for form sessions.
//!
//! Given a form, the current state and one user input, `transition` decides
//! the next state, the value to store and the effects the engine must run.
//! It performs no I/O.

use crate::channels::{OutgoingMessage, UserInput};
use crate::markup::{
    BOLD_DELIMITER, ITALIC_DELIMITER, balanced, currency_shape, normalize_markup,
    percentage_shape,
};

use super::definition::{FieldKind, FieldSpec, FormDefinition};
use super::prompts::{self, CANCEL_KEY, CANCEL_KEYWORD, CONFIRM_KEY};
use super::state::FormState;

/// Work the engine performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Tell the user how to cancel.
    CancelHint,
    /// Ask for field `i`.
    Prompt(usize),
    /// Show the collected values and ask for confirmation.
    Summary,
    /// Tell the user the form was cancelled.
    CancelNotice,
    /// Hand the collected values to the completion handler.
    Submit,
}

/// Result of an accepted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: FormState,
    /// Field key and normalized value to store.
    pub store: Option<(String, String)>,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn to(next: FormState) -> Self {
        Self {
            next,
            store: None,
            effects: vec![],
        }
    }

    pub fn storing(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.store = Some((key.into(), value.into()));
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Why an input was not accepted. The session stays where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A button was pressed where free text was expected.
    ExpectedText,
    /// Free text was sent where a button was expected.
    ExpectedSelection,
    /// The pressed button does not belong to the current field.
    UnknownOption,
    UnbalancedBold,
    UnbalancedItalic,
    /// Percentage or currency answer with the wrong shape.
    UnexpectedFormat,
    /// Anything other than confirm/cancel on the summary.
    ExpectedConfirmation,
    /// The session already reached a terminal state.
    Closed,
}

impl Rejection {
    /// Re-prompt for this rejection, if any.
    pub fn reply(&self, conversation_id: &str) -> Option<OutgoingMessage> {
        match self {
            Self::ExpectedText
            | Self::ExpectedSelection
            | Self::UnknownOption
            | Self::ExpectedConfirmation => Some(prompts::invalid_answer(conversation_id)),
            Self::UnbalancedBold => Some(prompts::unbalanced_bold(conversation_id)),
            Self::UnbalancedItalic => Some(prompts::unbalanced_italic(conversation_id)),
            Self::UnexpectedFormat => Some(prompts::unexpected_format(conversation_id)),
            Self::Closed => None,
        }
    }
}

/// Transition for a fresh session.
pub fn enter() -> Transition {
    Transition::to(FormState::initial())
        .with_effect(Effect::CancelHint)
        .with_effect(Effect::Prompt(0))
}

/// Apply one input to a session in `state`.
pub fn transition(
    definition: &FormDefinition,
    state: FormState,
    input: &UserInput,
) -> Result<Transition, Rejection> {
    if state.is_terminal() {
        return Err(Rejection::Closed);
    }

    if input.text() == Some(CANCEL_KEYWORD) {
        return Ok(Transition::to(FormState::Cancelled).with_effect(Effect::CancelNotice));
    }

    match (state, input) {
        (FormState::AwaitingField(index), input) => {
            let field = definition.field(index).ok_or(Rejection::Closed)?;
            let value = accept_field(field, input)?;
            let next = FormState::after_field(index, definition.len());
            let effect = match next {
                FormState::AwaitingField(i) => Effect::Prompt(i),
                _ => Effect::Summary,
            };
            Ok(Transition::to(next)
                .storing(field.key.clone(), value)
                .with_effect(effect))
        }

        (FormState::AwaitingConfirmation, UserInput::Selection(key)) if key == CONFIRM_KEY => {
            Ok(Transition::to(FormState::Completed).with_effect(Effect::Submit))
        }

        (FormState::AwaitingConfirmation, UserInput::Selection(key)) if key == CANCEL_KEY => {
            Ok(Transition::to(FormState::Cancelled).with_effect(Effect::CancelNotice))
        }

        (FormState::AwaitingConfirmation, _) => Err(Rejection::ExpectedConfirmation),

        (FormState::Completed | FormState::Cancelled, _) => Err(Rejection::Closed),
    }
}

fn accept_field(field: &FieldSpec, input: &UserInput) -> Result<String, Rejection> {
    match (&field.kind, input) {
        (FieldKind::Options(options), UserInput::Selection(key)) => {
            if options.iter().any(|o| &o.key == key) {
                Ok(key.clone())
            } else {
                Err(Rejection::UnknownOption)
            }
        }
        (FieldKind::Options(_), UserInput::Text(_)) => Err(Rejection::ExpectedSelection),
        (_, UserInput::Selection(_)) => Err(Rejection::ExpectedText),
        (kind, UserInput::Text(text)) => accept_text(kind, text),
    }
}

fn accept_text(kind: &FieldKind, text: &str) -> Result<String, Rejection> {
    if !balanced(text, BOLD_DELIMITER) {
        return Err(Rejection::UnbalancedBold);
    }
    if !balanced(text, ITALIC_DELIMITER) {
        return Err(Rejection::UnbalancedItalic);
    }

    let shape_ok = match kind {
        FieldKind::Percentage => percentage_shape(text),
        FieldKind::Currency => currency_shape(text),
        FieldKind::Text | FieldKind::Options(_) => true,
    };
    if !shape_ok {
        return Err(Rejection::UnexpectedFormat);
    }

    Ok(normalize_markup(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::definition::FieldOption;

    fn form() -> FormDefinition {
        FormDefinition::new(
            "investment",
            vec![
                FieldSpec::text("title", "Título", "t"),
                FieldSpec::percentage("rate", "Taxa", "r"),
                FieldSpec::currency("amount", "Valor", "a"),
                FieldSpec::options(
                    "risk",
                    "Risco",
                    "k",
                    vec![FieldOption::new("low", "Baixo"), FieldOption::new("high", "Alto")],
                ),
            ],
        )
        .unwrap()
    }

    fn text(s: &str) -> UserInput {
        UserInput::Text(s.to_string())
    }

    fn select(s: &str) -> UserInput {
        UserInput::Selection(s.to_string())
    }

    #[test]
    fn enter_hints_then_prompts_first_field() {
        let t = enter();
        assert_eq!(t.next, FormState::AwaitingField(0));
        assert_eq!(t.effects, vec![Effect::CancelHint, Effect::Prompt(0)]);
    }

    #[test]
    fn text_field_normalizes_and_advances() {
        let t = transition(&form(), FormState::AwaitingField(0), &text("<negrito>Top*1<negrito>"))
            .unwrap();
        assert_eq!(t.next, FormState::AwaitingField(1));
        assert_eq!(t.store, Some(("title".into(), "*Top\\*1*".into())));
        assert_eq!(t.effects, vec![Effect::Prompt(1)]);
    }

    #[test]
    fn text_field_rejects_selection() {
        let r = transition(&form(), FormState::AwaitingField(0), &select("low"));
        assert_eq!(r, Err(Rejection::ExpectedText));
    }

    #[test]
    fn unbalanced_delimiters_get_specific_rejections() {
        let f = form();
        assert_eq!(
            transition(&f, FormState::AwaitingField(0), &text("<negrito>oops")),
            Err(Rejection::UnbalancedBold)
        );
        assert_eq!(
            transition(&f, FormState::AwaitingField(0), &text("<italico>oops")),
            Err(Rejection::UnbalancedItalic)
        );
    }

    #[test]
    fn shape_checks() {
        let f = form();
        assert_eq!(
            transition(&f, FormState::AwaitingField(1), &text("123%")),
            Err(Rejection::UnexpectedFormat)
        );
        assert!(transition(&f, FormState::AwaitingField(1), &text("12,5%")).is_ok());
        assert_eq!(
            transition(&f, FormState::AwaitingField(2), &text("1234.56")),
            Err(Rejection::UnexpectedFormat)
        );
        let t = transition(&f, FormState::AwaitingField(2), &text("1.234,56")).unwrap();
        assert_eq!(t.store, Some(("amount".into(), "1.234,56".into())));
    }

    #[test]
    fn options_field_requires_known_selection() {
        let f = form();
        assert_eq!(
            transition(&f, FormState::AwaitingField(3), &text("low")),
            Err(Rejection::ExpectedSelection)
        );
        assert_eq!(
            transition(&f, FormState::AwaitingField(3), &select("medium")),
            Err(Rejection::UnknownOption)
        );
        let t = transition(&f, FormState::AwaitingField(3), &select("high")).unwrap();
        assert_eq!(t.next, FormState::AwaitingConfirmation);
        assert_eq!(t.store, Some(("risk".into(), "high".into())));
        assert_eq!(t.effects, vec![Effect::Summary]);
    }

    #[test]
    fn confirmation_accepts_only_confirm_or_cancel() {
        let f = form();
        let state = FormState::AwaitingConfirmation;
        assert_eq!(
            transition(&f, state, &text("sim")),
            Err(Rejection::ExpectedConfirmation)
        );
        assert_eq!(
            transition(&f, state, &select("high")),
            Err(Rejection::ExpectedConfirmation)
        );

        let confirm = transition(&f, state, &select(CONFIRM_KEY)).unwrap();
        assert_eq!(confirm.next, FormState::Completed);
        assert_eq!(confirm.effects, vec![Effect::Submit]);

        let cancel = transition(&f, state, &select(CANCEL_KEY)).unwrap();
        assert_eq!(cancel.next, FormState::Cancelled);
        assert_eq!(cancel.effects, vec![Effect::CancelNotice]);
    }

    #[test]
    fn cancel_keyword_works_in_every_live_state() {
        let f = form();
        let states = [
            FormState::AwaitingField(0),
            FormState::AwaitingField(1),
            FormState::AwaitingField(2),
            FormState::AwaitingField(3),
            FormState::AwaitingConfirmation,
        ];
        for state in states {
            let t = transition(&f, state, &text(CANCEL_KEYWORD)).unwrap();
            assert_eq!(t.next, FormState::Cancelled, "from {state}");
            assert_eq!(t.store, None);
            assert_eq!(t.effects, vec![Effect::CancelNotice]);
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        let f = form();
        assert_eq!(
            transition(&f, FormState::Completed, &text(CANCEL_KEYWORD)),
            Err(Rejection::Closed)
        );
        assert_eq!(
            transition(&f, FormState::Cancelled, &select(CONFIRM_KEY)),
            Err(Rejection::Closed)
        );
        assert!(Rejection::Closed.reply("c").is_none());
    }

    #[test]
    fn every_other_rejection_has_a_reply() {
        let rejections = [
            Rejection::ExpectedText,
            Rejection::ExpectedSelection,
            Rejection::UnknownOption,
            Rejection::UnbalancedBold,
            Rejection::UnbalancedItalic,
            Rejection::UnexpectedFormat,
            Rejection::ExpectedConfirmation,
        ];
        for r in rejections {
            assert!(r.reply("c").is_some(), "{r:?} should re-prompt");
        }
    }
}
