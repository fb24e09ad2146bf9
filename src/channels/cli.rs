//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Every line is a text answer, except lines starting with `#`, which press
//! the button whose callback data follows (`#register`, `#confirm`).

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, EventStream, IncomingEvent, InlineButton, MessageRef, Outbox, OutgoingMessage,
};
use crate::error::ChannelError;
use crate::markup::MarkupDialect;

const CONVERSATION_ID: &str = "cli";
const USER_ID: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel {
    next_message_id: AtomicU64,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Outbox for CliChannel {
    async fn send(&self, message: OutgoingMessage) -> Result<Option<MessageRef>, ChannelError> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        println!("\n{}\n", render(&message));
        eprint!("> ");
        Ok(Some(MessageRef {
            conversation_id: message.conversation_id,
            message_id: id.to_string(),
        }))
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        eprintln!("(message {} removed)", message.message_id);
        Ok(())
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            // Print prompt
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(event) = parse_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<IncomingEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let event = match line.strip_prefix('#') {
        Some(key) if !key.is_empty() => IncomingEvent::selection(CONVERSATION_ID, key),
        _ => IncomingEvent::text(CONVERSATION_ID, line),
    };
    Some(event.with_user(USER_ID))
}

/// Terminal rendering: MarkdownV2 escapes removed, buttons listed below.
fn render(message: &OutgoingMessage) -> String {
    let mut out = match message.dialect {
        MarkupDialect::Plain => message.text.clone(),
        MarkupDialect::MarkdownV2 => unescape(&message.text),
    };
    if let Some(keyboard) = &message.keyboard {
        for row in keyboard.rows() {
            let cells: Vec<String> = row
                .iter()
                .map(|button| match button {
                    InlineButton::Callback { label, data } => format!("[#{data}] {label}"),
                    InlineButton::Url { label, url } => format!("[{url}] {label}"),
                })
                .collect();
            out.push('\n');
            out.push_str(&cells.join("   "));
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}
