use async_trait::async_trait;
use tracing::info;

use super::AlertSink;
use crate::Result;

/// Emits each alert as a structured log record tagged `telegram = true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send_alert(&self, channel: &str, username: &str, text: &str) -> Result<()> {
        info!(
            target: "dredge::alert",
            channel = %channel,
            username = %username,
            telegram = true,
            "{text}"
        );
        Ok(())
    }
}
