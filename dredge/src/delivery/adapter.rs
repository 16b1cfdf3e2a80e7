//! Per-listener delivery session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::DedupCache;
use super::dedup::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::Result;
use crate::pubsub::{Envelope, GLOBAL_TOPIC, PubSub};

/// Text frame a listener sends to check liveness.
const PING: &str = "ping";

/// Writes envelopes to the listener.
#[async_trait]
pub trait OutboundSink: Send {
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;
}

/// A frame read from the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    /// Binary, ping/pong and other control frames.
    Other,
}

/// Reads frames from the listener. `None` once the connection is closed.
#[async_trait]
pub trait InboundSource: Send {
    async fn recv(&mut self) -> Option<InboundFrame>;
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub topics: Vec<String>,
    pub queue_capacity: usize,
    pub dedup_ttl: Duration,
    pub dedup_max_entries: usize,
    pub write_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            topics: vec![GLOBAL_TOPIC.to_string()],
            queue_capacity: 16,
            dedup_ttl: DEFAULT_TTL,
            dedup_max_entries: DEFAULT_MAX_ENTRIES,
            write_timeout: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Nothing was read within the read timeout.
    ReadTimeout,
    /// The listener closed the connection.
    Closed,
    /// A write failed or exceeded the write timeout.
    WriteFailed,
    Cancelled,
}

/// Connects one listener to the bus.
pub struct DeliverySession {
    bus: Arc<PubSub<Envelope>>,
    config: DeliveryConfig,
}

impl DeliverySession {
    pub fn new(bus: Arc<PubSub<Envelope>>, config: DeliveryConfig) -> Self {
        Self { bus, config }
    }

    /// Serve the listener until it goes idle, disconnects, a write fails or
    /// `cancel` fires. Every subscription is removed before returning.
    pub async fn run<S, R>(self, sink: S, mut source: R, cancel: CancellationToken) -> SessionEnd
    where
        S: OutboundSink + 'static,
        R: InboundSource,
    {
        let (tx, rx) = mpsc::channel::<Envelope>(self.config.queue_capacity.max(1));

        let handles: Vec<_> = self
            .config
            .topics
            .iter()
            .map(|topic| {
                let tx = tx.clone();
                self.bus.subscribe(topic, move |envelope: &Envelope| {
                    enqueue(&tx, envelope.clone());
                })
            })
            .collect();

        let drain_cancel = cancel.child_token();
        let dedup = DedupCache::new(self.config.dedup_ttl, self.config.dedup_max_entries);
        let mut drain = tokio::spawn(drain(
            rx,
            sink,
            dedup,
            self.config.write_timeout,
            drain_cancel.clone(),
        ));
        let mut drain_done = false;

        let end = loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break SessionEnd::Cancelled,
                _ = &mut drain => {
                    drain_done = true;
                    break SessionEnd::WriteFailed;
                }
                frame = timeout(self.config.read_timeout, source.recv()) => frame,
            };

            match frame {
                Err(_) => break SessionEnd::ReadTimeout,
                Ok(None) => break SessionEnd::Closed,
                Ok(Some(InboundFrame::Text(text))) if text.trim() == PING => {
                    enqueue(&tx, Envelope::pong());
                }
                Ok(Some(frame)) => trace!(?frame, "Ignoring listener frame"),
            }
        };

        for handle in &handles {
            self.bus.unsubscribe(handle);
        }
        drop(tx);
        drain_cancel.cancel();
        if !drain_done {
            let _ = drain.await;
        }

        debug!(reason = ?end, "Delivery session ended");
        end
    }
}

fn enqueue(tx: &mpsc::Sender<Envelope>, envelope: Envelope) {
    match tx.try_send(envelope) {
        Ok(()) => {}
        Err(TrySendError::Full(envelope)) => {
            warn!(id = ?envelope.id(), "Delivery queue full, dropping envelope");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

async fn drain<S: OutboundSink>(
    mut rx: mpsc::Receiver<Envelope>,
    mut sink: S,
    dedup: DedupCache,
    write_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        if let Some(id) = envelope.id()
            && !dedup.first_seen(id)
        {
            trace!(id, "Suppressing duplicate envelope");
            continue;
        }

        match timeout(write_timeout, sink.send(&envelope)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "Delivery write failed");
                break;
            }
            Err(_) => {
                warn!(timeout = ?write_timeout, "Delivery write timed out");
                break;
            }
        }
    }
}
