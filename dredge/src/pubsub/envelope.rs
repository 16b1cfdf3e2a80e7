use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;

/// Payload carried on the bus and written to WebSocket listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    /// `{"message": {...}}`
    Message { message: ChatMessage },
    /// `{"cmd": "pong"}`
    Command { cmd: String },
}

impl Envelope {
    pub fn message(message: ChatMessage) -> Self {
        Self::Message { message }
    }

    pub fn command(cmd: impl Into<String>) -> Self {
        Self::Command { cmd: cmd.into() }
    }

    pub fn pong() -> Self {
        Self::command("pong")
    }

    /// Identity used for deduplication. Commands have none.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Message { message } if !message.id.is_empty() => Some(&message.id),
            _ => None,
        }
    }
}
