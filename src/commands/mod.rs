//! Bot commands and button actions outside of forms.

pub mod register;

use crate::channels::{InlineButton, InlineKeyboard, OutgoingMessage, UserInput};
use crate::config::LinkConfig;

pub use register::{REGISTER_ACTION, REGISTER_FORM, RegistrationHandler, registration_form};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `/start`: welcome message with the register button.
    Start,
    /// `/ajuda`: support contact.
    Help,
    /// The register button: enter the registration form.
    Register,
}

impl Command {
    /// Recognize a command or action. Trailing arguments and `@botname`
    /// suffixes on commands are ignored.
    pub fn parse(input: &UserInput) -> Option<Self> {
        match input {
            UserInput::Selection(key) if key == REGISTER_ACTION => Some(Self::Register),
            UserInput::Selection(_) => None,
            UserInput::Text(text) => {
                let word = text.split_whitespace().next()?;
                let name = word.split('@').next().unwrap_or(word);
                match name {
                    "/start" => Some(Self::Start),
                    "/ajuda" => Some(Self::Help),
                    _ => None,
                }
            }
        }
    }
}

pub fn welcome(conversation_id: &str, links: &LinkConfig) -> OutgoingMessage {
    let mut buttons = vec![InlineButton::callback("🔑 Cadastrar", REGISTER_ACTION)];
    if let Some(url) = &links.platform_url {
        buttons.push(InlineButton::url("📊 Acessar Plataforma", url.clone()));
    }
    if let Some(url) = &links.group_url {
        buttons.push(InlineButton::url("💬 Acessar Grupo", url.clone()));
    }
    if let Some(url) = &links.support_url {
        buttons.push(InlineButton::url("📞 Suporte", url.clone()));
    }

    OutgoingMessage::markdown(
        conversation_id,
        "🤖 *Sejam bem\\-vindos\\!* 🤖\n\n\
         Clique no botão \"Cadastrar\" abaixo para criar uma conta\\.",
    )
    .with_keyboard(InlineKeyboard::new(buttons, 1))
}

pub fn help(conversation_id: &str, links: &LinkConfig) -> OutgoingMessage {
    match &links.support_url {
        Some(url) => OutgoingMessage::markdown(
            conversation_id,
            "*Para entrar em contato com o suporte, basta clicar no botão abaixo* 👇",
        )
        .with_keyboard(InlineKeyboard::row(vec![InlineButton::url(
            "💬 Entrar em contato",
            url.clone(),
        )])),
        None => OutgoingMessage::plain(
            conversation_id,
            "O suporte ainda não tem um canal de contato configurado.",
        ),
    }
}

/// Sent when a user interacts faster than the cooldown allows.
pub fn throttled_notice(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::markdown(
        conversation_id,
        "😬 *Você está executando comandos muito rapidamente\\! \
         Por favor, aguarde um momento antes de tentar novamente\\.*",
    )
}

/// Generic apology after an unexpected failure.
pub fn apology(conversation_id: &str) -> OutgoingMessage {
    OutgoingMessage::markdown(
        conversation_id,
        "🐞 *Ops\\! Algo deu errado\\. Tente novamente mais tarde\\.* 🐞\n\n\
         _Se o problema continuar, entre em contato com o suporte\\._",
    )
}
