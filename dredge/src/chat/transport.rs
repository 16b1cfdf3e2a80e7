//! Chat transport.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Twitch chat over secure WebSocket.
pub const TWITCH_IRC_WS_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Inbound frames buffered per connection.
const INBOUND_CAPACITY: usize = 256;

/// An established transport.
///
/// Dropping `outbound` closes the connection; `inbound` yields raw text
/// frames and ends when the connection is lost.
pub struct ChatConnection {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Opens transports to the chat network.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self) -> Result<ChatConnection>;
}

/// tokio-tungstenite implementation.
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(TWITCH_IRC_WS_URL)
    }
}

#[async_trait]
impl ChatConnector for WebSocketConnector {
    async fn connect(&self) -> Result<ChatConnection> {
        crate::utils::http_client::install_rustls_provider();

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket connect to {} failed: {e}", self.url)))?;
        debug!(url = %self.url, "Chat WebSocket connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_CAPACITY);

        tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                trace!(line = %redact(&line), "Chat send");
                if let Err(e) = write.send(Message::text(line)).await {
                    warn!(error = %e, "Chat WebSocket write failed");
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
            debug!("Chat WebSocket writer closed");
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = inbound_tx.closed() => break,
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if inbound_tx.send(text.as_str().to_owned()).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Chat WebSocket closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Chat WebSocket read failed");
                            break;
                        }
                        None => break,
                    }
                }
            }
        });

        Ok(ChatConnection {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Hide the token of a `PASS` line.
fn redact(line: &str) -> &str {
    if line.starts_with("PASS ") {
        "PASS ***"
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_pass() {
        assert_eq!(redact("PASS oauth:secret"), "PASS ***");
        assert_eq!(redact("JOIN #chan"), "JOIN #chan");
    }
}
