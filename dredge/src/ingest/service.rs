//! Chat message ingestion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use super::AlertMatcher;
use crate::chat::{ChatMessage, MessageListener};
use crate::notification::AlertSink;
use crate::pubsub::{Envelope, GLOBAL_TOPIC, PubSub};
use crate::storage::{MessageRepository, StoredMessage};

/// Alerts waiting for the sink before new ones are dropped.
pub const DEFAULT_ALERT_QUEUE_CAPACITY: usize = 256;

struct PendingAlert {
    channel: String,
    username: String,
    text: String,
}

/// What happened to one ingested message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub persisted: bool,
    /// Subscribers that received the message.
    pub delivered: usize,
    /// The message matched a selector and was queued for the alert sink.
    pub alerted: bool,
}

/// Persists, publishes and alert-checks every chat message.
///
/// Alerts go through a bounded queue drained by one worker task, so a slow
/// sink delays alerts instead of piling up tasks. The worker stops when the
/// service is dropped.
pub struct IngestService {
    repository: Arc<dyn MessageRepository>,
    bus: Arc<PubSub<Envelope>>,
    matcher: AlertMatcher,
    alerts: mpsc::Sender<PendingAlert>,
}

impl IngestService {
    /// Must be called inside a tokio runtime.
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        bus: Arc<PubSub<Envelope>>,
        matcher: AlertMatcher,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self::with_alert_queue_capacity(
            repository,
            bus,
            matcher,
            sink,
            DEFAULT_ALERT_QUEUE_CAPACITY,
        )
    }

    pub fn with_alert_queue_capacity(
        repository: Arc<dyn MessageRepository>,
        bus: Arc<PubSub<Envelope>>,
        matcher: AlertMatcher,
        sink: Arc<dyn AlertSink>,
        capacity: usize,
    ) -> Self {
        let (alerts, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(alert_worker(rx, sink));
        Self {
            repository,
            bus,
            matcher,
            alerts,
        }
    }

    /// Handle one message.
    ///
    /// A storage failure is logged and does not stop publication. Alerts are
    /// sent on a separate task.
    pub async fn handle(&self, message: ChatMessage) -> IngestOutcome {
        debug!(
            channel = %message.channel,
            username = %message.username,
            message_id = %message.id,
            text = %message.text,
            "Message"
        );

        let persisted = match self
            .repository
            .create_message(&StoredMessage::from(&message))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(
                    channel = %message.channel,
                    username = %message.username,
                    message_id = %message.id,
                    error = %e,
                    "Failed to store message"
                );
                false
            }
        };

        let alerted = self
            .matcher
            .is_alertable(&message.channel, &message.username, &message.text)
            && self.queue_alert(&message);

        let delivered = self.bus.publish(GLOBAL_TOPIC, &Envelope::message(message));

        IngestOutcome {
            persisted,
            delivered,
            alerted,
        }
    }

    fn queue_alert(&self, message: &ChatMessage) -> bool {
        let alert = PendingAlert {
            channel: message.channel.clone(),
            username: message.username.clone(),
            text: message.text.clone(),
        };
        match self.alerts.try_send(alert) {
            Ok(()) => true,
            Err(TrySendError::Full(alert)) => {
                warn!(
                    channel = %alert.channel,
                    username = %alert.username,
                    "Alert queue full, dropping alert"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!("Alert worker stopped, dropping alert");
                false
            }
        }
    }
}

async fn alert_worker(mut rx: mpsc::Receiver<PendingAlert>, sink: Arc<dyn AlertSink>) {
    while let Some(alert) = rx.recv().await {
        if let Err(e) = sink
            .send_alert(&alert.channel, &alert.username, &alert.text)
            .await
        {
            warn!(
                sink = sink.name(),
                channel = %alert.channel,
                username = %alert.username,
                error = %e,
                "Failed to send alert"
            );
        }
    }
    debug!("Alert worker stopped");
}

#[async_trait]
impl MessageListener for IngestService {
    async fn on_message(&self, message: ChatMessage) {
        self.handle(message).await;
    }
}
