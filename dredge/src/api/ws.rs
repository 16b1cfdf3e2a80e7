//! WebSocket delivery endpoint.
//!
//! Each connection becomes a [`DeliverySession`] on the `global` topic. The
//! client may send the text frame `ping` and receives `{"cmd":"pong"}`.

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use super::AppState;
use crate::delivery::{DeliverySession, InboundFrame, InboundSource, OutboundSink};
use crate::pubsub::Envelope;
use crate::{Error, Result};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    debug!("WebSocket listener connected");
    let (sender, receiver) = socket.split();

    let session = DeliverySession::new(state.bus.clone(), state.delivery.clone());
    let end = session
        .run(
            WsSink { sender },
            WsSource { receiver },
            state.shutdown.child_token(),
        )
        .await;

    debug!(reason = ?end, "WebSocket listener disconnected");
}

struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl OutboundSink for WsSink {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let json = serde_json::to_string(envelope)?;
        self.sender
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| Error::connection(format!("WebSocket write failed: {e}")))
    }
}

struct WsSource {
    receiver: SplitStream<WebSocket>,
}

#[async_trait]
impl InboundSource for WsSource {
    async fn recv(&mut self) -> Option<InboundFrame> {
        match self.receiver.next().await {
            Some(Ok(Message::Text(text))) => Some(InboundFrame::Text(text.as_str().to_owned())),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => None,
            Some(Ok(_)) => Some(InboundFrame::Other),
        }
    }
}
