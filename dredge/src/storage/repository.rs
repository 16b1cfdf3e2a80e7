//! Message repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::SearchParams;
use super::time::{datetime_to_ms, ms_to_datetime};
use crate::Result;
use crate::chat::ChatMessage;

/// Hard cap on search page size.
pub const MAX_SEARCH_LIMIT: i64 = 1000;

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub created: DateTime<Utc>,
    pub username: String,
    pub channel: String,
    pub text: String,
}

impl From<&ChatMessage> for StoredMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.clone(),
            created: message.timestamp,
            username: message.username.clone(),
            channel: message.channel.clone(),
            text: message.text.clone(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    created: i64,
    username: String,
    channel: String,
    text: String,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            created: ms_to_datetime(row.created),
            username: row.username,
            channel: row.channel,
            text: row.text,
        }
    }
}

/// Message storage operations.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a message. Storing the same id twice is a no-op.
    async fn create_message(&self, message: &StoredMessage) -> Result<()>;

    /// Total number of stored messages.
    async fn count_messages(&self) -> Result<i64>;

    /// Messages matching `params`, newest first.
    async fn search(
        &self,
        params: &SearchParams,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>>;
}

/// SQLx implementation of MessageRepository.
pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn create_message(&self, message: &StoredMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, created, channel, username, text, search_text)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&message.id)
        .bind(datetime_to_ms(message.created))
        .bind(&message.channel)
        .bind(&message.username)
        .bind(&message.text)
        .bind(message.text.to_lowercase())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_messages(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    async fn search(
        &self,
        params: &SearchParams,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<StoredMessage>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, created, username, channel, text FROM messages WHERE 1 = 1",
        );

        if let Some(username) = &params.username {
            query.push(" AND username = ").push_bind(username);
        }
        if let Some(channel) = &params.channel {
            query.push(" AND channel = ").push_bind(channel);
        }
        if let Some(from) = params.date_from {
            query.push(" AND created >= ").push_bind(datetime_to_ms(from));
        }
        if let Some(to) = params.date_to {
            query.push(" AND created <= ").push_bind(datetime_to_ms(to));
        }
        if let Some(text) = &params.text {
            query
                .push(" AND search_text LIKE ")
                .push_bind(format!("%{}%", escape_like(&text.to_lowercase())))
                .push(" ESCAPE '\\'");
        }

        query
            .push(" ORDER BY created DESC LIMIT ")
            .push_bind(limit.clamp(0, MAX_SEARCH_LIMIT))
            .push(" OFFSET ")
            .push_bind(offset.max(0));

        let rows = query
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }
}

/// Escape `LIKE` wildcards so the text is matched literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
