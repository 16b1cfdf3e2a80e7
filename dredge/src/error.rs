//! Application-wide error types.

use thiserror::Error;

use crate::credentials::CredentialError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("IRC protocol error: {0}")]
    Irc(#[from] twitch_irc::IrcError),

    #[error("Chat connection error: {0}")]
    Connection(String),

    #[error("Upstream API error: {status} - {message}")]
    Upstream { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid alert pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Whether repeating the failed operation can succeed.
    ///
    /// Client errors other than 401 (token refreshed meanwhile), 408 and 429
    /// are final, as are rejected credentials and local errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Credential(e) => e.is_transient(),
            Self::Upstream { status, .. } => {
                !(400..500).contains(status) || matches!(status, 401 | 408 | 429)
            }
            Self::Configuration(_) | Self::InvalidPattern { .. } | Self::Cancelled => false,
            _ => true,
        }
    }
}
