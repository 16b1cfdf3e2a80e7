//! Chat message model.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use twitch_irc::IrcMessage;
use twitch_irc::command::normalize_channel;

/// A chat line received from a joined channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    /// Lowercase, without `#`.
    pub channel: String,
    /// Lowercase login name.
    pub username: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

impl ChatMessage {
    /// Build a message from a `PRIVMSG` line.
    ///
    /// Returns `None` for other commands or lines without a channel/sender.
    /// The server `id` tag becomes the message id when present; otherwise a
    /// random one is generated.
    pub fn from_irc(msg: &IrcMessage) -> Option<Self> {
        if !msg.is("PRIVMSG") || msg.params.len() < 2 {
            return None;
        }

        let channel = normalize_channel(msg.channel()?);
        let username = msg
            .tag("login")
            .or_else(|| msg.nick())
            .or_else(|| msg.tag("display-name"))
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty())?;
        if channel.is_empty() {
            return None;
        }

        let id = msg
            .tag("id")
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let timestamp = msg
            .tag("tmi-sent-ts")
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Some(Self {
            id,
            channel,
            username,
            text: msg.trailing().unwrap_or_default().trim().to_string(),
            timestamp,
            tags: msg.tags.clone(),
        })
    }

    /// Display name if the server sent one, otherwise the login.
    pub fn display_name(&self) -> &str {
        self.tags
            .get("display-name")
            .map(String::as_str)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}
