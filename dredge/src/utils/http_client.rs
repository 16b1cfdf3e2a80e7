use std::{sync::OnceLock, time::Duration};

use tracing::debug;

/// Default timeout for upstream API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Shared HTTP client for the Twitch APIs and the Telegram channel.
pub fn build_client(user_agent: &str) -> reqwest::Result<reqwest::Client> {
    install_rustls_provider();
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
}
