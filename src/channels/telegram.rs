//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text messages become `UserInput::Text`, inline button presses become
//! `UserInput::Selection` carrying the button's callback data.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::channels::{
    Channel, ChatKind, EventStream, IncomingEvent, InlineButton, InlineKeyboard, MessageRef,
    Outbox, OutgoingMessage,
};
use crate::error::ChannelError;
use crate::markup::MarkupDialect;

const API_BASE: &str = "https://api.telegram.org";
/// Delivery attempts per outbound message.
const SEND_ATTEMPTS: u32 = 3;
const SEND_RETRY_DELAY: Duration = Duration::from_secs(1);
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Thin Bot API client shared by the channel and its polling task.
#[derive(Clone)]
struct BotApi {
    client: reqwest::Client,
    bot_token: String,
}

impl BotApi {
    fn url(&self, method: &str) -> String {
        format!("{API_BASE}/bot{}/{method}", self.bot_token)
    }

    /// Call a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, String> {
        let resp = self
            .client
            .post(self.url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| e.to_string())?;
        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(format!("{method} returned {status}: {description}"));
        }
        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Telegram channel, connected to the Bot API via long-polling.
pub struct TelegramChannel {
    api: BotApi,
    shutdown: Arc<AtomicBool>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramChannel {
    pub fn new(bot_token: String) -> Self {
        Self {
            api: BotApi {
                client: reqwest::Client::new(),
                bot_token,
            },
            shutdown: Arc::new(AtomicBool::new(false)),
            poller: Mutex::new(None),
        }
    }

    async fn send_once(&self, body: &Value) -> Result<MessageRef, String> {
        let result = self.api.call("sendMessage", body).await?;
        let chat_id = result
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
            .map(|id| id.to_string());
        let message_id = result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or("sendMessage result has no message_id")?;
        Ok(MessageRef {
            conversation_id: chat_id.unwrap_or_default(),
            message_id: message_id.to_string(),
        })
    }
}

#[async_trait]
impl Outbox for TelegramChannel {
    async fn send(&self, message: OutgoingMessage) -> Result<Option<MessageRef>, ChannelError> {
        let body = send_body(&message);
        let mut last_error = String::new();

        for attempt in 1..=SEND_ATTEMPTS {
            match self.send_once(&body).await {
                Ok(mut sent) => {
                    if sent.conversation_id.is_empty() {
                        sent.conversation_id = message.conversation_id;
                    }
                    return Ok(Some(sent));
                }
                Err(e) => {
                    tracing::warn!(
                        chat_id = %message.conversation_id,
                        attempt,
                        error = %e,
                        "Telegram sendMessage failed"
                    );
                    last_error = e;
                    if attempt < SEND_ATTEMPTS {
                        tokio::time::sleep(SEND_RETRY_DELAY).await;
                    }
                }
            }
        }

        Err(ChannelError::SendFailed {
            name: "telegram".into(),
            reason: last_error,
        })
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        let message_id: i64 = message
            .message_id
            .parse()
            .map_err(|_| ChannelError::DeleteFailed {
                name: "telegram".into(),
                reason: format!("invalid message id {}", message.message_id),
            })?;

        self.api
            .call(
                "deleteMessage",
                &json!({ "chat_id": message.conversation_id, "message_id": message_id }),
            )
            .await
            .map(|_| ())
            .map_err(|reason| ChannelError::DeleteFailed {
                name: "telegram".into(),
                reason,
            })
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let api = self.api.clone();
        let shutdown = Arc::clone(&self.shutdown);
        shutdown.store(false, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                if shutdown.load(Ordering::Relaxed) {
                    tracing::info!("Telegram poll loop shutting down");
                    return;
                }

                let body = json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "callback_query"]
                });

                let updates = match api.call("getUpdates", &body).await {
                    Ok(Value::Array(updates)) => updates,
                    Ok(_) => Vec::new(),
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                for update in &updates {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = parse_update(update) else {
                        continue;
                    };

                    if let Some(callback_id) = &parsed.callback_id {
                        let answer = json!({ "callback_query_id": callback_id });
                        if let Err(e) = api.call("answerCallbackQuery", &answer).await {
                            tracing::debug!("Telegram answerCallbackQuery failed: {e}");
                        }
                    }

                    if tx.send(parsed.event).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        if let Ok(mut poller) = self.poller.lock()
            && let Some(old) = poller.replace(handle)
        {
            old.abort();
        }

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.api
            .call("getMe", &json!({}))
            .await
            .map(|_| ())
            .map_err(|reason| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason,
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        self.shutdown.store(true, Ordering::Relaxed);
        // A pending long-poll would otherwise hold the loop for its full timeout.
        if let Ok(mut poller) = self.poller.lock()
            && let Some(handle) = poller.take()
        {
            handle.abort();
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

struct ParsedUpdate {
    event: IncomingEvent,
    /// Set for button presses, which must be answered.
    callback_id: Option<String>,
}

/// Turn one `getUpdates` entry into an event. Updates without text or
/// callback data are skipped.
fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(query) = update.get("callback_query") {
        let data = query.get("data").and_then(Value::as_str)?;
        let message = query.get("message")?;
        let (chat_id, chat_kind) = chat_of(message)?;
        let mut event = IncomingEvent::selection(chat_id, data).with_chat_kind(chat_kind);
        if let Some(user_id) = user_of(query) {
            event = event.with_user(user_id);
        }
        return Some(ParsedUpdate {
            event,
            callback_id: query.get("id").and_then(Value::as_str).map(String::from),
        });
    }

    let message = update.get("message")?;
    let text = message.get("text").and_then(Value::as_str)?;
    let (chat_id, chat_kind) = chat_of(message)?;
    let mut event = IncomingEvent::text(chat_id, text).with_chat_kind(chat_kind);
    if let Some(user_id) = user_of(message) {
        event = event.with_user(user_id);
    }
    Some(ParsedUpdate {
        event,
        callback_id: None,
    })
}

fn chat_of(message: &Value) -> Option<(String, ChatKind)> {
    let chat = message.get("chat")?;
    let id = chat.get("id").and_then(Value::as_i64)?;
    let kind = chat
        .get("type")
        .and_then(Value::as_str)
        .map(ChatKind::from_telegram)
        .unwrap_or(ChatKind::Private);
    Some((id.to_string(), kind))
}

fn user_of(value: &Value) -> Option<String> {
    value
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
}

/// `sendMessage` request body.
fn send_body(message: &OutgoingMessage) -> Value {
    let mut body = json!({
        "chat_id": message.conversation_id,
        "text": message.text,
    });
    if message.dialect == MarkupDialect::MarkdownV2 {
        body["parse_mode"] = json!("MarkdownV2");
    }
    if let Some(keyboard) = &message.keyboard {
        body["reply_markup"] = json!({ "inline_keyboard": keyboard_rows(keyboard) });
    }
    body
}

fn keyboard_rows(keyboard: &InlineKeyboard) -> Vec<Vec<Value>> {
    keyboard
        .rows()
        .map(|row| {
            row.iter()
                .map(|button| match button {
                    InlineButton::Callback { label, data } => {
                        json!({ "text": label, "callback_data": data })
                    }
                    InlineButton::Url { label, url } => json!({ "text": label, "url": url }),
                })
                .collect()
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::UserInput;

    #[test]
    fn telegram_channel_name() {
        let ch = TelegramChannel::new("fake-token".into());
        assert_eq!(ch.name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = TelegramChannel::new("123:ABC".into());
        assert_eq!(
            ch.api.url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn parse_text_message() {
        let update = json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": { "id": 42, "first_name": "Ana" },
                "chat": { "id": 42, "type": "private" },
                "text": "Ana Maria"
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert!(parsed.callback_id.is_none());
        assert_eq!(parsed.event.conversation_id, "42");
        assert_eq!(parsed.event.user_id.as_deref(), Some("42"));
        assert_eq!(parsed.event.chat_kind, ChatKind::Private);
        assert_eq!(parsed.event.input, UserInput::Text("Ana Maria".into()));
    }

    #[test]
    fn parse_callback_query() {
        let update = json!({
            "update_id": 11,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7 },
                "data": "register",
                "message": { "message_id": 9, "chat": { "id": -100, "type": "supergroup" } }
            }
        });
        let parsed = parse_update(&update).unwrap();
        assert_eq!(parsed.callback_id.as_deref(), Some("cb-1"));
        assert_eq!(parsed.event.conversation_id, "-100");
        assert_eq!(parsed.event.chat_kind, ChatKind::Supergroup);
        assert_eq!(parsed.event.input, UserInput::Selection("register".into()));
    }

    #[test]
    fn parse_skips_non_text_messages() {
        let update = json!({
            "update_id": 12,
            "message": { "message_id": 1, "chat": { "id": 1, "type": "private" }, "sticker": {} }
        });
        assert!(parse_update(&update).is_none());
        assert!(parse_update(&json!({ "update_id": 13 })).is_none());
    }

    #[test]
    fn send_body_markdown_with_keyboard() {
        let message = OutgoingMessage::markdown("42", "*Olá*").with_keyboard(InlineKeyboard::new(
            vec![
                InlineButton::callback("Cadastrar", "register"),
                InlineButton::url("Suporte", "https://s.test"),
                InlineButton::callback("Outro", "other"),
            ],
            2,
        ));
        let body = send_body(&message);
        assert_eq!(body["parse_mode"], "MarkdownV2");
        assert_eq!(
            body["reply_markup"]["inline_keyboard"],
            json!([
                [
                    { "text": "Cadastrar", "callback_data": "register" },
                    { "text": "Suporte", "url": "https://s.test" }
                ],
                [ { "text": "Outro", "callback_data": "other" } ]
            ])
        );
    }

    #[test]
    fn send_body_plain_has_no_parse_mode() {
        let body = send_body(&OutgoingMessage::plain("42", "oi"));
        assert!(body.get("parse_mode").is_none());
        assert!(body.get("reply_markup").is_none());
    }

    #[tokio::test]
    async fn shutdown_ends_the_event_stream() {
        use futures::StreamExt;

        let ch = TelegramChannel::new("fake-token".into());
        let mut events = ch.start().await.unwrap();
        ch.shutdown().await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("stream should close after shutdown");
        assert!(next.is_none());
        assert!(ch.poller.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_rejects_non_numeric_id() {
        let ch = TelegramChannel::new("fake-token".into());
        let err = ch
            .delete(&MessageRef {
                conversation_id: "42".into(),
                message_id: "abc".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::DeleteFailed { .. }));
    }
}
