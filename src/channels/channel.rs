//! Transport-neutral message types and the channel traits.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::markup::MarkupDialect;

/// Stream of inbound events produced by a channel.
pub type EventStream = Pin<Box<dyn Stream<Item = IncomingEvent> + Send>>;

/// What kind of chat an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    /// Parse a Telegram `chat.type` value.
    pub fn from_telegram(kind: &str) -> Self {
        match kind {
            "group" => Self::Group,
            "supergroup" => Self::Supergroup,
            "channel" => Self::Channel,
            _ => Self::Private,
        }
    }

    /// Whether the chat is a one-to-one conversation.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// A user's answer: free text or a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Text(String),
    Selection(String),
}

impl UserInput {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Selection(_) => None,
        }
    }
}

/// An event delivered by a transport.
#[derive(Debug, Clone)]
pub struct IncomingEvent {
    /// Stable id of the conversation (chat) the event belongs to.
    pub conversation_id: String,
    /// Sender id, when the transport knows it.
    pub user_id: Option<String>,
    pub chat_kind: ChatKind,
    pub input: UserInput,
}

impl IncomingEvent {
    pub fn text(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: None,
            chat_kind: ChatKind::Private,
            input: UserInput::Text(text.into()),
        }
    }

    pub fn selection(conversation_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: None,
            chat_kind: ChatKind::Private,
            input: UserInput::Selection(key.into()),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_chat_kind(mut self, kind: ChatKind) -> Self {
        self.chat_kind = kind;
        self
    }

    /// Key of the sender's form session and worker. Members of a shared
    /// chat each get their own; replies still go to `conversation_id`.
    pub fn session_key(&self) -> String {
        match &self.user_id {
            Some(user) if !self.chat_kind.is_private() => {
                format!("{}:{user}", self.conversation_id)
            }
            _ => self.conversation_id.clone(),
        }
    }
}

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineButton {
    /// Pressing the button sends `data` back as a selection.
    Callback { label: String, data: String },
    /// Pressing the button opens `url`.
    Url { label: String, url: String },
}

impl InlineButton {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Callback {
            label: label.into(),
            data: data.into(),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Url {
            label: label.into(),
            url: url.into(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Callback { label, .. } | Self::Url { label, .. } => label,
        }
    }
}

/// Buttons laid out in rows of `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
    pub columns: usize,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>, columns: usize) -> Self {
        Self {
            buttons,
            columns: columns.max(1),
        }
    }

    /// All buttons on a single row.
    pub fn row(buttons: Vec<InlineButton>) -> Self {
        let columns = buttons.len();
        Self::new(buttons, columns)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[InlineButton]> {
        self.buttons.chunks(self.columns)
    }
}

/// A message to render back to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub text: String,
    pub dialect: MarkupDialect,
    pub keyboard: Option<InlineKeyboard>,
}

impl OutgoingMessage {
    /// A MarkdownV2 message; `text` must already be escaped.
    pub fn markdown(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: text.into(),
            dialect: MarkupDialect::MarkdownV2,
            keyboard: None,
        }
    }

    pub fn plain(conversation_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            text: text.into(),
            dialect: MarkupDialect::Plain,
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// Handle to a delivered message, used to delete it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub conversation_id: String,
    pub message_id: String,
}

/// Outbound half of a transport.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Deliver a message. Returns a handle when the transport can address it.
    async fn send(&self, message: OutgoingMessage) -> Result<Option<MessageRef>, ChannelError>;

    /// Delete a previously delivered message.
    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError>;
}

/// A full transport: inbound stream plus outbound delivery.
#[async_trait]
pub trait Channel: Outbox {
    fn name(&self) -> &str;

    /// Start receiving events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}
