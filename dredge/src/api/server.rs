//! API server setup.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::Span;

use super::ws;
use crate::chat::ChatSession;
use crate::delivery::DeliveryConfig;
use crate::error::{Error, Result};
use crate::pubsub::{Envelope, GLOBAL_TOPIC, PubSub};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<PubSub<Envelope>>,
    pub delivery: DeliveryConfig,
    pub chat: Option<ChatSession>,
    /// Cancelled on shutdown; ends every delivery session.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(bus: Arc<PubSub<Envelope>>, shutdown: CancellationToken) -> Self {
        Self {
            bus,
            delivery: DeliveryConfig::default(),
            chat: None,
            shutdown,
        }
    }

    pub fn with_chat(mut self, chat: ChatSession) -> Self {
        self.chat = Some(chat);
        self
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    chat_connected: Option<bool>,
    joined_channels: Option<usize>,
    listeners: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        chat_connected: state.chat.as_ref().map(ChatSession::is_connected),
        joined_channels: state.chat.as_ref().map(|c| c.joined_channels().len()),
        listeners: state.bus.subscriber_count(GLOBAL_TOPIC),
    })
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// API server.
pub struct ApiServer {
    listen_addr: String,
    state: AppState,
}

impl ApiServer {
    pub fn new(listen_addr: impl Into<String>, state: AppState) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            state,
        }
    }

    /// Build the router with all middleware and routes.
    fn build_router(&self) -> Router {
        create_router(self.state.clone()).layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path() == "/health" {
                        Span::none()
                    } else {
                        let mut make_span =
                            tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                        use tower_http::trace::MakeSpan;
                        make_span.make_span(req)
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if span.is_disabled() {
                            return;
                        }
                        let on_response =
                            tower_http::trace::DefaultOnResponse::new().level(tracing::Level::DEBUG);
                        use tower_http::trace::OnResponse;
                        on_response.on_response(res, latency, span);
                    },
                ),
        )
    }

    /// Serve until the shutdown token is cancelled.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .map_err(|e| Error::config(format!("Invalid listen address '{}': {e}", self.listen_addr)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let bus = Arc::new(PubSub::new());
        bus.subscribe(GLOBAL_TOPIC, |_: &Envelope| {});
        let router = create_router(AppState::new(bus, CancellationToken::new()));

        let response = router
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["listeners"], 1);
        assert!(body["chat_connected"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_listen_address() {
        let server = ApiServer::new(
            "not-an-address",
            AppState::new(Arc::new(PubSub::new()), CancellationToken::new()),
        );
        assert!(matches!(server.run().await, Err(Error::Configuration(_))));
    }
}
