//! Chat session client.
//!
//! Keeps one IRC-over-WebSocket connection to Twitch chat, the set of
//! channels it has joined, and a single handler for incoming messages.

mod listener;
mod message;
mod session;
mod transport;

use std::collections::HashSet;

pub use listener::MessageListener;
pub use message::ChatMessage;
pub use session::{ChatSession, ChatSessionConfig};
pub use transport::{ChatConnection, ChatConnector, TWITCH_IRC_WS_URL, WebSocketConnector};

/// Join/leave surface driven by live-set discovery.
pub trait ChannelMembership: Send + Sync {
    /// Returns `false` if the channel was already joined.
    fn join_channel(&self, name: &str) -> bool;
    /// Returns `false` if the channel was not joined.
    fn leave_channel(&self, name: &str) -> bool;
    fn joined_channels(&self) -> HashSet<String>;
}
