//! Twitch IRC codec.
//!
//! Decoding of IRC lines (including IRCv3 tags) and formatting of the
//! commands a chat session sends. Transport is left to the caller; Twitch
//! serves the same protocol over plain TCP, TLS and WebSocket.

pub mod command;
pub mod error;
pub mod message;

pub use error::{IrcError, Result};
pub use message::IrcMessage;
