//! HTTP surface: the WebSocket delivery endpoint and a health probe.

pub mod server;
pub mod ws;

pub use server::{ApiServer, AppState};
