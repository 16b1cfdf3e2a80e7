//! Credential error types.

use thiserror::Error;

/// Errors that can occur while obtaining access tokens.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The refresh token was rejected - a new login is required.
    #[error("Invalid refresh token - re-login required")]
    InvalidRefreshToken,

    /// Token endpoint returned an unexpected status.
    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be understood.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Rate limited - try again later.
    #[error("Rate limited - try again later")]
    RateLimited,
}

impl CredentialError {
    /// Check if this error requires manual re-login.
    pub fn requires_relogin(&self) -> bool {
        matches!(self, Self::InvalidRefreshToken)
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited | Self::ParseError(_)
        )
    }
}
