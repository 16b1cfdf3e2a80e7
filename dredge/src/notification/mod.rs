//! Alert notification sinks.

mod log_sink;
mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::Result;

pub use log_sink::LogAlertSink;
pub use telegram::TelegramAlertSink;

/// Receives alertable chat messages.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Sink name for logs.
    fn name(&self) -> &'static str;

    async fn send_alert(&self, channel: &str, username: &str, text: &str) -> Result<()>;
}

/// Forwards every alert to all inner sinks.
///
/// One failing sink does not stop the others; the first error is returned.
#[derive(Default)]
pub struct FanoutAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AlertSink for FanoutAlertSink {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn send_alert(&self, channel: &str, username: &str, text: &str) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.send_alert(channel, username, text).await {
                warn!(sink = sink.name(), error = %e, "Alert sink failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
