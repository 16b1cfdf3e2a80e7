//! dredge: follows live Twitch channels, ingests their chat, raises alerts
//! and streams messages to WebSocket listeners.

pub mod api;
pub mod chat;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod discovery;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod notification;
pub mod panic_hook;
pub mod pubsub;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
