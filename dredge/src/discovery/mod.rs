//! Live-set discovery.
//!
//! Polls the platform's paginated live-stream listing and keeps the chat
//! session joined to exactly the channels that are live (plus any permanent
//! channels).

mod retry;
mod service;
mod source;

pub use retry::retry_fixed;
pub use service::{LiveSetDiscovery, ReconcileSummary};
pub use source::{HELIX_STREAMS_URL, HelixStreamSource, LiveStreamSource, StreamPage, StreamRecord};
