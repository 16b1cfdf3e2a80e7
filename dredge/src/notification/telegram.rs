//! Telegram Bot API alert sink.
//!
//! Sends alerts via `POST /bot<token>/sendMessage`. A 429 reply carries
//! `parameters.retry_after`, which is honoured up to [`MAX_RETRY_AFTER`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::AlertSink;
use crate::config::TelegramConfig;
use crate::{Error, Result};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Total `sendMessage` attempts per alert while rate limited.
const MAX_ATTEMPTS: u32 = 3;

/// Longest rate-limit wait a single alert may hold the alert worker for.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

impl ApiResponse {
    fn retry_after(&self) -> Option<Duration> {
        self.parameters
            .as_ref()
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs)
    }
}

pub struct TelegramAlertSink {
    config: TelegramConfig,
    client: Client,
    api_base: String,
}

impl TelegramAlertSink {
    pub fn new(client: Client, config: TelegramConfig) -> Self {
        Self {
            config,
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn build_message(&self, channel: &str, username: &str, text: &str) -> String {
        format!(
            "\u{1f514} <b>{}</b> in <a href=\"https://twitch.tv/{channel}\">#{channel}</a>\n\n{}",
            escape_html(username),
            escape_html(text),
        )
    }

    async fn post(&self, payload: &serde_json::Value) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.config.token);

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::Other(format!("Telegram request failed: {}", e.without_url())))?;

            let status = response.status().as_u16();
            if response.status().is_success() {
                return Ok(());
            }

            let body: ApiResponse = response.json().await.unwrap_or_default();
            let description = body.description.clone().unwrap_or_default();

            if status != 429 {
                return Err(Error::upstream(
                    status,
                    format!("Telegram sendMessage failed: {description}"),
                ));
            }
            if attempt == MAX_ATTEMPTS {
                break;
            }

            let wait = body
                .retry_after()
                .unwrap_or(Duration::from_secs(1))
                .min(MAX_RETRY_AFTER);
            debug!(attempt, ?wait, "Telegram rate limited");
            tokio::time::sleep(wait).await;
        }

        warn!(attempts = MAX_ATTEMPTS, "Telegram still rate limited, giving up");
        Err(Error::upstream(429, "Telegram rate limit exceeded"))
    }
}

#[async_trait]
impl AlertSink for TelegramAlertSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send_alert(&self, channel: &str, username: &str, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": self.build_message(channel, username, text),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        self.post(&payload).await?;

        debug!(channel, username, "Telegram alert sent");
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::build_client;

    const SEND_PATH: &str = "/bot123:ABC/sendMessage";

    fn sink(api_base: &str) -> TelegramAlertSink {
        TelegramAlertSink::new(
            build_client("dredge-test").unwrap(),
            TelegramConfig {
                token: "123:ABC".to_string(),
                chat_id: "456".to_string(),
            },
        )
        .with_api_base(api_base)
    }

    fn rate_limited(retry_after: u64) -> String {
        json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests",
            "parameters": { "retry_after": retry_after }
        })
        .to_string()
    }

    #[test]
    fn test_build_message_escapes_user_text() {
        let msg = sink(TELEGRAM_API_BASE).build_message("chan", "alice", "<script> & stuff");
        assert!(msg.contains("<b>alice</b>"));
        assert!(msg.contains("https://twitch.tv/chan"));
        assert!(msg.contains("&lt;script&gt; &amp; stuff"));
    }

    #[test]
    fn test_retry_after_parsing() {
        let body: ApiResponse = serde_json::from_str(&rate_limited(7)).unwrap();
        assert_eq!(body.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(body.description.as_deref(), Some("Too Many Requests"));

        let body: ApiResponse = serde_json::from_str(r#"{"ok":false}"#).unwrap();
        assert_eq!(body.retry_after(), None);
    }

    #[tokio::test]
    async fn test_send_alert_posts_chat_and_html_mode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", SEND_PATH)
            .match_body(mockito::Matcher::PartialJson(json!({
                "chat_id": "456",
                "parse_mode": "HTML",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        sink(&server.url())
            .send_alert("chan", "alice", "hello")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_waits_then_retries() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", SEND_PATH)
            .with_status(429)
            .with_body(rate_limited(0))
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("POST", SEND_PATH)
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .expect(1)
            .create_async()
            .await;

        sink(&server.url())
            .send_alert("chan", "alice", "hello")
            .await
            .unwrap();
        limited.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("POST", SEND_PATH)
            .with_status(429)
            .with_body(rate_limited(0))
            .expect(MAX_ATTEMPTS as usize)
            .create_async()
            .await;

        let err = sink(&server.url())
            .send_alert("chan", "alice", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 429, .. }));
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_request_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", SEND_PATH)
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = sink(&server.url())
            .send_alert("chan", "alice", "hello")
            .await
            .unwrap_err();
        match err {
            Error::Upstream { status, message } => {
                assert_eq!(status, 400);
                assert!(message.contains("chat not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        rejected.assert_async().await;
    }
}
