//! User-facing copy for the form flow.
//!
//! MarkdownV2 texts are stored pre-escaped; anything built from user or
//! field data goes through `escape_reserved`.

use crate::channels::{InlineButton, InlineKeyboard, OutgoingMessage};
use crate::markup::escape_reserved;

use super::definition::{FieldKind, FieldSpec, FormDefinition};
use super::session::FormValues;

/// Text that cancels the active form from any step.
pub const CANCEL_KEYWORD: &str = "/cancelar";
/// Selection key of the summary's confirm button.
pub const CONFIRM_KEY: &str = "confirm";
/// Selection key of the summary's cancel button.
pub const CANCEL_KEY: &str = "cancel";

const CURRENCY_PREFIX: &str = "R$ ";

pub fn cancel_hint(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::plain(
        conversation_id,
        format!("Você pode cancelar a operação a qualquer momento digitando {CANCEL_KEYWORD}."),
    )
}

pub fn cancelled_notice(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::plain(conversation_id, "Operação cancelada com sucesso!")
}

pub fn invalid_answer(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::plain(conversation_id, "Resposta invalida, tente novamente.")
}

pub fn unexpected_format(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::plain(
        conversation_id,
        "A resposta não está no formato esperado, tente novamente.",
    )
}

pub fn unbalanced_bold(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::markdown(
        conversation_id,
        "⚠️ *Parece que há um problema com a formatação em negrito\\. Lembre\\-se de que, \
         para deixar um texto em negrito, é necessário usar \"\\<negrito\\>\" no início e no \
         final da frase ou palavra\\. Tente novamente\\!*",
    )
}

pub fn unbalanced_italic(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::markdown(
        conversation_id,
        "⚠️ *Parece que há um problema com a formatação em itálico\\. Lembre\\-se de que, \
         para deixar um texto em itálico, é necessário usar \"\\<italico\\>\" no início e no \
         final da frase ou palavra\\. Tente novamente\\!*",
    )
}

pub fn already_active(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::plain(
        conversation_id,
        format!(
            "Você já tem uma operação em andamento. Conclua-a ou digite {CANCEL_KEYWORD} para cancelar."
        ),
    )
}

/// Prompt for a field, with buttons for options fields.
pub fn field_prompt(conversation_id: &str, field: &FieldSpec) -> OutgoingMessage {
    let message = OutgoingMessage::markdown(conversation_id, field.prompt.clone());
    match &field.kind {
        FieldKind::Options(options) => message.with_keyboard(InlineKeyboard::new(
            options
                .iter()
                .map(|o| InlineButton::callback(o.label.clone(), o.key.clone()))
                .collect(),
            field.keyboard_columns,
        )),
        _ => message,
    }
}

/// Confirmation summary of every collected value.
pub fn summary(conversation_id: &str, definition: &FormDefinition, values: &FormValues) -> OutgoingMessage {
    let lines: Vec<String> = values
        .iter()
        .filter_map(|(key, value)| {
            let field = definition.field_by_key(key)?;
            let shown = field.option_label(value).unwrap_or(value);
            let prefix = if matches!(field.kind, FieldKind::Currency) {
                CURRENCY_PREFIX
            } else {
                ""
            };
            Some(format!(
                "*{}:* {}{}",
                escape_reserved(&field.display_name),
                prefix,
                escape_reserved(shown)
            ))
        })
        .collect();

    OutgoingMessage::markdown(
        conversation_id,
        format!("{}\n\nDeseja continuar a operação?", lines.join("\n")),
    )
    .with_keyboard(InlineKeyboard::row(vec![
        InlineButton::callback("Cancelar", CANCEL_KEY),
        InlineButton::callback("Continuar", CONFIRM_KEY),
    ]))
}
