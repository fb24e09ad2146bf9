//! Customer registration: the form, and what happens once it is confirmed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api::{ApiClient, NewCustomer, RegistrationOutcome};
use crate::channels::{InlineButton, InlineKeyboard, Outbox, OutgoingMessage};
use crate::config::LinkConfig;
use crate::error::{ConfigError, Error, HandlerError};
use crate::forms::{CompletionHandler, FieldSpec, FormDefinition, FormValues};
use crate::markup::escape_reserved;

pub const REGISTER_FORM: &str = "register_form";
/// Callback data of every "register" button.
pub const REGISTER_ACTION: &str = "register";

const DEFAULT_FAILURE_DETAIL: &str =
    "_Verifique os dados e tente novamente\\! Se o problema persistir entre em contato com o suporte\\._";

pub fn registration_form() -> Result<FormDefinition, ConfigError> {
    FormDefinition::new(
        REGISTER_FORM,
        vec![
            FieldSpec::text("name", "Nome", "*Digite seu nome:*"),
            FieldSpec::text("email", "E-mail", "*Digite seu e\\-mail:*"),
            FieldSpec::text("password", "Senha", "*Digite sua senha:*"),
        ],
    )
}

/// Submits a confirmed registration to the admin API.
pub struct RegistrationHandler {
    api: Arc<ApiClient>,
    links: LinkConfig,
}

impl RegistrationHandler {
    pub fn new(api: Arc<ApiClient>, links: LinkConfig) -> Self {
        Self { api, links }
    }

    fn customer(values: &FormValues) -> Result<NewCustomer, HandlerError> {
        let field = |key: &str| {
            values
                .get(key)
                .map(str::to_string)
                .ok_or_else(|| HandlerError::MissingField(key.to_string()))
        };
        Ok(NewCustomer::new(field("name")?, field("email")?, field("password")?))
    }
}

#[async_trait]
impl CompletionHandler for RegistrationHandler {
    async fn on_complete(
        &self,
        conversation_id: &str,
        values: &FormValues,
        outbox: &dyn Outbox,
    ) -> Result<(), Error> {
        let customer = Self::customer(values)?;

        let feedback = outbox
            .send(OutgoingMessage::markdown(
                conversation_id,
                "⏳ *Seu cadastro está sendo realizado\\.\\.\\.*",
            ))
            .await?;

        let outcome = self.api.register_customer(&customer).await;

        if let Some(feedback) = feedback
            && let Err(e) = outbox.delete(&feedback).await
        {
            warn!(conversation_id, error = %e, "Could not remove progress message");
        }

        let reply = match outcome {
            RegistrationOutcome::Registered => {
                info!(conversation_id, "Registration submitted");
                success_message(conversation_id, &self.links)
            }
            RegistrationOutcome::Failed { message } => {
                failure_message(conversation_id, message.as_deref())
            }
        };
        outbox.send(reply).await?;
        Ok(())
    }
}

fn success_message(conversation_id: &str, links: &LinkConfig) -> OutgoingMessage {
    let message = OutgoingMessage::markdown(conversation_id, "✅ *Cadastro realizado com sucesso\\!* ✅");
    match &links.platform_url {
        Some(url) => message.with_keyboard(InlineKeyboard::row(vec![InlineButton::url(
            "📊 Acessar Plataforma",
            url.clone(),
        )])),
        None => message,
    }
}

fn failure_message(conversation_id: &str, server_message: Option<&str>) -> OutgoingMessage {
    let detail = server_message
        .map(|m| escape_reserved(m).replace('*', "\\*").replace('_', "\\_"))
        .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string());
    OutgoingMessage::markdown(
        conversation_id,
        format!("⚠️ *Falha ao realizar cadastro* ⚠️\n\n{detail}"),
    )
    .with_keyboard(InlineKeyboard::row(vec![InlineButton::callback(
        "Tentar Novamente",
        REGISTER_ACTION,
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_asks_name_email_password() {
        let form = registration_form().unwrap();
        let keys: Vec<&str> = form.fields().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["name", "email", "password"]);
    }

    #[test]
    fn customer_requires_every_field() {
        let mut values = FormValues::default();
        values.insert("name", "Ana");
        values.insert("email", "ana@x.test");
        assert!(matches!(
            RegistrationHandler::customer(&values),
            Err(HandlerError::MissingField(key)) if key == "password"
        ));

        values.insert("password", "pw");
        let customer = RegistrationHandler::customer(&values).unwrap();
        assert_eq!(customer.role, "customer");
    }

    #[test]
    fn failure_shows_escaped_server_message() {
        let message = failure_message("c1", Some("E-mail já_cadastrado."));
        assert_eq!(
            message.text,
            "⚠️ *Falha ao realizar cadastro* ⚠️\n\nE\\-mail já\\_cadastrado\\."
        );
        let keyboard = message.keyboard.unwrap();
        assert_eq!(
            keyboard.buttons,
            vec![InlineButton::callback("Tentar Novamente", REGISTER_ACTION)]
        );
    }

    #[test]
    fn failure_without_server_message_uses_default() {
        let message = failure_message("c1", None);
        assert!(message.text.ends_with(DEFAULT_FAILURE_DETAIL));
    }

    #[test]
    fn success_links_platform_when_configured() {
        let links = LinkConfig {
            platform_url: Some("https://platform.test".into()),
            ..LinkConfig::default()
        };
        assert!(success_message("c1", &links).keyboard.is_some());
        assert!(success_message("c1", &LinkConfig::default()).keyboard.is_none());
    }
}
