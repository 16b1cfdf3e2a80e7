//! Credential lifecycle management.
//!
//! The bot account authenticates with a short-lived OAuth access token that
//! is minted from a long-lived refresh token.
//!
//! - [`TokenExchanger`]: Exchanges a refresh token for a new access token
//! - [`TwitchTokenExchanger`]: Twitch `id.twitch.tv` implementation
//! - [`TokenManager`]: Owns the current token, refreshes it and notifies dependents

mod error;
mod exchanger;
mod manager;

pub use error::CredentialError;
pub use exchanger::{RefreshedToken, TokenExchanger, TwitchTokenExchanger};
pub use manager::{AccessToken, DEFAULT_REFRESH_INTERVAL, DEFAULT_STALE_AFTER, TokenManager};
