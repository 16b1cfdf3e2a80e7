//! Live-stream listing.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::credentials::TokenManager;
use crate::{Error, Result};

/// Helix "Get Streams" endpoint.
pub const HELIX_STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";

/// Page size requested from Helix (its maximum).
const PAGE_SIZE: &str = "100";

/// One live channel as reported by the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub login: String,
    /// Zero-based index of the page the channel was seen on.
    pub page: usize,
}

/// One page of the listing.
#[derive(Debug, Clone, Default)]
pub struct StreamPage {
    pub logins: Vec<String>,
    /// Cursor for the next page; `None` on the last page.
    pub cursor: Option<String>,
}

/// Paginated source of currently live channels.
#[async_trait]
pub trait LiveStreamSource: Send + Sync {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<StreamPage>;
}

#[derive(Debug, Deserialize)]
struct StreamsResponse {
    #[serde(default)]
    data: Vec<StreamData>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Deserialize)]
struct StreamData {
    user_login: String,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    cursor: Option<String>,
}

/// Helix implementation. Uses the bot's user access token.
pub struct HelixStreamSource {
    client: Client,
    tokens: Arc<TokenManager>,
    client_id: String,
    game_id: Option<String>,
    url: String,
}

impl HelixStreamSource {
    pub fn new(client: Client, tokens: Arc<TokenManager>, client_id: impl Into<String>) -> Self {
        Self {
            client,
            tokens,
            client_id: client_id.into(),
            game_id: None,
            url: HELIX_STREAMS_URL.to_string(),
        }
    }

    /// Restrict the listing to one game/category.
    pub fn with_game_id(mut self, game_id: Option<String>) -> Self {
        self.game_id = game_id.filter(|g| !g.trim().is_empty());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl LiveStreamSource for HelixStreamSource {
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<StreamPage> {
        self.tokens.ensure_fresh().await?;
        let token = self.tokens.current_token();

        let mut query: Vec<(&str, &str)> = vec![("first", PAGE_SIZE)];
        if let Some(cursor) = cursor {
            query.push(("after", cursor));
        }
        if let Some(game_id) = self.game_id.as_deref() {
            query.push(("game_id", game_id));
        }

        let response = self
            .client
            .get(&self.url)
            .query(&query)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                // Token revoked or expired early; make the next attempt use a new one.
                if let Err(e) = self.tokens.refresh().await {
                    warn!(error = %e, "Token refresh after 401 failed");
                }
            }
            return Err(Error::upstream(status.as_u16(), body));
        }

        let body: StreamsResponse = response.json().await?;
        let page = StreamPage {
            logins: body.data.into_iter().map(|s| s.user_login).collect(),
            cursor: body.pagination.cursor.filter(|c| !c.is_empty()),
        };
        debug!(
            count = page.logins.len(),
            has_next = page.cursor.is_some(),
            "Fetched live streams page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TwitchTokenExchanger;
    use crate::utils::http_client::build_client;
    use mockito::Matcher;

    async fn token_mock(server: &mut mockito::Server, access_token: &str) -> mockito::Mock {
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(format!(r#"{{"access_token":"{access_token}","expires_in":14400}}"#))
            .expect(1)
            .create_async()
            .await
    }

    fn source(server: &mockito::Server) -> HelixStreamSource {
        let client = build_client("dredge-test").unwrap();
        let exchanger = TwitchTokenExchanger::new(client.clone(), "cid", "secret")
            .with_token_url(format!("{}/oauth2/token", server.url()));
        let tokens = Arc::new(TokenManager::new(Arc::new(exchanger), "rt"));
        HelixStreamSource::new(client, tokens, "cid")
            .with_url(format!("{}/helix/streams", server.url()))
    }

    #[tokio::test]
    async fn test_fetch_page_sends_cursor_and_game() {
        let mut server = mockito::Server::new_async().await;
        let _token = token_mock(&mut server, "at1").await;
        let streams = server
            .mock("GET", "/helix/streams")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("first".into(), "100".into()),
                Matcher::UrlEncoded("after".into(), "c1".into()),
                Matcher::UrlEncoded("game_id".into(), "491487".into()),
            ]))
            .match_header("client-id", "cid")
            .match_header("authorization", "Bearer at1")
            .with_status(200)
            .with_body(
                r#"{"data":[{"user_login":"alice"},{"user_login":"bob"}],"pagination":{"cursor":"c2"}}"#,
            )
            .create_async()
            .await;

        let page = source(&server)
            .with_game_id(Some("491487".to_string()))
            .fetch_page(Some("c1"))
            .await
            .unwrap();
        assert_eq!(page.logins, vec!["alice", "bob"]);
        assert_eq!(page.cursor.as_deref(), Some("c2"));
        streams.assert_async().await;
    }

    #[tokio::test]
    async fn test_first_page_has_no_after_param() {
        let mut server = mockito::Server::new_async().await;
        let _token = token_mock(&mut server, "at1").await;
        let _streams = server
            .mock("GET", "/helix/streams")
            .match_query(Matcher::Regex("after=".into()))
            .with_status(500)
            .create_async()
            .await;
        let streams = server
            .mock("GET", "/helix/streams")
            .match_query(Matcher::UrlEncoded("first".into(), "100".into()))
            .with_status(200)
            .with_body(r#"{"data":[],"pagination":{}}"#)
            .create_async()
            .await;

        let page = source(&server)
            .with_game_id(Some("  ".to_string()))
            .fetch_page(None)
            .await
            .unwrap();
        assert!(page.logins.is_empty());
        assert!(page.cursor.is_none());
        streams.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_cursor_means_last_page() {
        let mut server = mockito::Server::new_async().await;
        let _token = token_mock(&mut server, "at1").await;
        let _streams = server
            .mock("GET", "/helix/streams")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[{"user_login":"alice"}],"pagination":{"cursor":""}}"#)
            .create_async()
            .await;

        let page = source(&server).fetch_page(Some("c1")).await.unwrap();
        assert_eq!(page.logins, vec!["alice"]);
        assert_eq!(page.cursor, None);
    }

    #[tokio::test]
    async fn test_unauthorized_forces_token_refresh() {
        let mut server = mockito::Server::new_async().await;
        let first = token_mock(&mut server, "at1").await;
        let second = token_mock(&mut server, "at2").await;
        let streams = server
            .mock("GET", "/helix/streams")
            .match_query(Matcher::Any)
            .match_header("authorization", "Bearer at1")
            .with_status(401)
            .with_body(r#"{"error":"Unauthorized","status":401,"message":"Invalid OAuth token"}"#)
            .create_async()
            .await;

        let source = source(&server);
        let err = source.fetch_page(None).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 401, .. }));
        assert_eq!(source.tokens.current_token(), "at2");
        first.assert_async().await;
        second.assert_async().await;
        streams.assert_async().await;
    }

    #[test]
    fn test_parse_streams_response() {
        let json = r#"{
            "data": [
                {"id": "1", "user_login": "alice", "user_name": "Alice", "game_id": "491487"},
                {"id": "2", "user_login": "bob", "user_name": "Bob", "game_id": "491487"}
            ],
            "pagination": {"cursor": "eyJiIjpudWxsfQ"}
        }"#;
        let body: StreamsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.data.len(), 2);
        assert_eq!(body.data[1].user_login, "bob");
        assert_eq!(body.pagination.cursor.as_deref(), Some("eyJiIjpudWxsfQ"));
    }

    #[test]
    fn test_parse_last_page() {
        let body: StreamsResponse =
            serde_json::from_str(r#"{"data": [], "pagination": {}}"#).unwrap();
        assert!(body.data.is_empty());
        assert!(body.pagination.cursor.is_none());
    }
}
