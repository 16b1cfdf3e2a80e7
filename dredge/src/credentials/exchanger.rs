//! Refresh-token exchange.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::CredentialError;

/// Default Twitch OAuth token endpoint.
pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Result of a successful exchange.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Rotated refresh token, when the endpoint issues one.
    pub refresh_token: Option<String>,
    /// Lifetime reported by the endpoint.
    pub expires_in: Option<Duration>,
}

/// Exchanges a long-lived refresh token for a short-lived access token.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<RefreshedToken, CredentialError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Twitch implementation using the `refresh_token` grant.
pub struct TwitchTokenExchanger {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl TwitchTokenExchanger {
    pub fn new(client: Client, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: TWITCH_TOKEN_URL.to_string(),
        }
    }

    /// Override the token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

#[async_trait]
impl TokenExchanger for TwitchTokenExchanger {
    async fn exchange(&self, refresh_token: &str) -> Result<RefreshedToken, CredentialError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.client.post(&self.token_url).form(&form).send().await?;
        let status = response.status();

        match status {
            s if s.is_success() => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                debug!(status = %status, body = %body, "Token endpoint rejected refresh token");
                return Err(CredentialError::InvalidRefreshToken);
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(CredentialError::RateLimited),
            _ => {
                let body = response.text().await.unwrap_or_default();
                return Err(CredentialError::RefreshFailed(format!("{status} - {body}")));
            }
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::ParseError(e.to_string()))?;

        if body.access_token.is_empty() {
            return Err(CredentialError::ParseError(
                "token response has no access_token".to_string(),
            ));
        }

        Ok(RefreshedToken {
            access_token: body.access_token,
            refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::build_client;
    use mockito::Matcher;

    fn exchanger(server: &mockito::Server) -> TwitchTokenExchanger {
        TwitchTokenExchanger::new(build_client("dredge-test").unwrap(), "cid", "secret")
            .with_token_url(format!("{}/oauth2/token", server.url()))
    }

    #[tokio::test]
    async fn test_exchange_picks_up_rotated_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "rt1".into()),
                Matcher::UrlEncoded("client_id".into(), "cid".into()),
                Matcher::UrlEncoded("client_secret".into(), "secret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at1","refresh_token":"rt2","expires_in":14400,"scope":["chat:read"],"token_type":"bearer"}"#,
            )
            .create_async()
            .await;

        let token = exchanger(&server).exchange("rt1").await.unwrap();
        assert_eq!(token.access_token, "at1");
        assert_eq!(token.refresh_token.as_deref(), Some("rt2"));
        assert_eq!(token.expires_in, Some(Duration::from_secs(14400)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_rotated_token_is_ignored() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"at1","refresh_token":""}"#)
            .create_async()
            .await;

        let token = exchanger(&server).exchange("rt1").await.unwrap();
        assert_eq!(token.refresh_token, None);
        assert_eq!(token.expires_in, None);
    }

    #[tokio::test]
    async fn test_rejected_refresh_token() {
        for status in [400, 401] {
            let mut server = mockito::Server::new_async().await;
            let _mock = server
                .mock("POST", "/oauth2/token")
                .with_status(status)
                .with_body(r#"{"status":400,"message":"Invalid refresh token"}"#)
                .create_async()
                .await;

            let err = exchanger(&server).exchange("revoked").await.unwrap_err();
            assert!(
                matches!(err, CredentialError::InvalidRefreshToken),
                "status {status} gave {err:?}"
            );
            assert!(err.requires_relogin());
        }
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(429)
            .create_async()
            .await;

        let err = exchanger(&server).exchange("rt1").await.unwrap_err();
        assert!(matches!(err, CredentialError::RateLimited));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_server_error_is_refresh_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let err = exchanger(&server).exchange("rt1").await.unwrap_err();
        match err {
            CredentialError::RefreshFailed(msg) => assert!(msg.contains("503")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_access_token_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"","refresh_token":"rt2"}"#)
            .create_async()
            .await;

        let err = exchanger(&server).exchange("rt1").await.unwrap_err();
        assert!(matches!(err, CredentialError::ParseError(_)));
    }
}
