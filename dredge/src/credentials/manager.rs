//! Access token ownership and refresh.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CredentialError, TokenExchanger};

/// Tokens older than this are refreshed by [`TokenManager::ensure_fresh`].
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);

/// Cadence of [`TokenManager::run_refresh_loop`].
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Refresh this long before a server-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The current access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub refreshed_at: Instant,
    pub expires_in: Option<Duration>,
}

impl AccessToken {
    fn is_stale(&self, stale_after: Duration, now: Instant) -> bool {
        let age = now.saturating_duration_since(self.refreshed_at);
        if age >= stale_after {
            return true;
        }
        self.expires_in
            .is_some_and(|lifetime| age + EXPIRY_MARGIN >= lifetime)
    }
}

struct TokenState {
    refresh_token: String,
    access: Option<AccessToken>,
}

/// Owns the bot account's OAuth credentials.
///
/// Readers get a copy of the token; the lock is never held across an await.
/// Refreshes are serialized so concurrent `ensure_fresh` callers trigger a
/// single exchange.
pub struct TokenManager {
    exchanger: Arc<dyn TokenExchanger>,
    state: Mutex<TokenState>,
    refresh_lock: tokio::sync::Mutex<()>,
    token_tx: watch::Sender<String>,
    stale_after: Duration,
}

impl TokenManager {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, refresh_token: impl Into<String>) -> Self {
        let (token_tx, _) = watch::channel(String::new());
        Self {
            exchanger,
            state: Mutex::new(TokenState {
                refresh_token: refresh_token.into(),
                access: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            token_tx,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Perform the first exchange. Callers treat failure as fatal.
    pub async fn initialize(&self) -> Result<(), CredentialError> {
        self.refresh().await?;
        info!("Access token initialized");
        Ok(())
    }

    /// Copy of the current access token, empty before initialization.
    pub fn current_token(&self) -> String {
        self.state
            .lock()
            .access
            .as_ref()
            .map(|t| t.value.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the current token with its metadata.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.state.lock().access.clone()
    }

    /// Receiver notified with every successfully refreshed token.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.token_tx.subscribe()
    }

    pub fn is_stale(&self) -> bool {
        let state = self.state.lock();
        match &state.access {
            Some(token) => token.is_stale(self.stale_after, Instant::now()),
            None => true,
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// On failure the previous token is kept.
    pub async fn refresh(&self) -> Result<(), CredentialError> {
        let _guard = self.refresh_lock.lock().await;
        self.exchange_locked().await
    }

    /// Refresh only if the token is absent or stale.
    pub async fn ensure_fresh(&self) -> Result<(), CredentialError> {
        if !self.is_stale() {
            return Ok(());
        }
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        if !self.is_stale() {
            return Ok(());
        }
        self.exchange_locked().await
    }

    async fn exchange_locked(&self) -> Result<(), CredentialError> {
        let refresh_token = self.state.lock().refresh_token.clone();

        let refreshed = match self.exchanger.exchange(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(
                    error = %e,
                    requires_relogin = e.requires_relogin(),
                    "Token refresh failed, keeping previous token"
                );
                return Err(e);
            }
        };

        let value = refreshed.access_token.clone();
        {
            let mut state = self.state.lock();
            if let Some(rotated) = refreshed.refresh_token {
                debug!("Refresh token rotated");
                state.refresh_token = rotated;
            }
            state.access = Some(AccessToken {
                value: refreshed.access_token,
                refreshed_at: Instant::now(),
                expires_in: refreshed.expires_in,
            });
        }
        self.token_tx.send_replace(value);

        debug!(expires_in = ?refreshed.expires_in, "Access token refreshed");
        Ok(())
    }

    /// Refresh on a fixed cadence until cancelled.
    pub async fn run_refresh_loop(&self, cancel: CancellationToken, period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Token refresh loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        warn!(error = %e, "Scheduled token refresh failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::RefreshedToken;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedExchanger {
        responses: Mutex<VecDeque<Result<RefreshedToken, CredentialError>>>,
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedExchanger {
        fn new(responses: Vec<Result<RefreshedToken, CredentialError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenExchanger for ScriptedExchanger {
        async fn exchange(&self, refresh_token: &str) -> Result<RefreshedToken, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(refresh_token.to_string());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Err(CredentialError::RefreshFailed("exhausted".into())))
        }
    }

    fn token(access: &str) -> Result<RefreshedToken, CredentialError> {
        Ok(RefreshedToken {
            access_token: access.to_string(),
            refresh_token: None,
            expires_in: None,
        })
    }

    #[tokio::test]
    async fn test_current_token_empty_before_initialize() {
        let manager = TokenManager::new(ScriptedExchanger::new(vec![]), "rt");
        assert_eq!(manager.current_token(), "");
        assert!(manager.is_stale());
    }

    #[tokio::test]
    async fn test_initialize_sets_token_and_notifies() {
        let manager = TokenManager::new(ScriptedExchanger::new(vec![token("a1")]), "rt");
        let mut rx = manager.subscribe();

        manager.initialize().await.unwrap();

        assert_eq!(manager.current_token(), "a1");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "a1");
    }

    #[tokio::test]
    async fn test_initialize_failure_is_reported() {
        let manager = TokenManager::new(
            ScriptedExchanger::new(vec![Err(CredentialError::InvalidRefreshToken)]),
            "rt",
        );
        let err = manager.initialize().await.unwrap_err();
        assert!(err.requires_relogin());
        assert_eq!(manager.current_token(), "");
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_token() {
        let manager = TokenManager::new(
            ScriptedExchanger::new(vec![token("a1"), Err(CredentialError::RateLimited)]),
            "rt",
        );
        manager.initialize().await.unwrap();
        let mut rx = manager.subscribe();

        assert!(manager.refresh().await.is_err());
        assert_eq!(manager.current_token(), "a1");
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_used_next_time() {
        let exchanger = ScriptedExchanger::new(vec![
            Ok(RefreshedToken {
                access_token: "a1".into(),
                refresh_token: Some("rt2".into()),
                expires_in: None,
            }),
            token("a2"),
        ]);
        let manager = TokenManager::new(exchanger.clone(), "rt1");

        manager.refresh().await.unwrap();
        manager.refresh().await.unwrap();

        assert_eq!(*exchanger.seen.lock(), vec!["rt1", "rt2"]);
        assert_eq!(manager.current_token(), "a2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_fresh_only_refreshes_stale_token() {
        let exchanger = ScriptedExchanger::new(vec![token("a1"), token("a2")]);
        let manager = TokenManager::new(exchanger.clone(), "rt");
        manager.initialize().await.unwrap();

        manager.ensure_fresh().await.unwrap();
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(DEFAULT_STALE_AFTER + Duration::from_secs(1)).await;
        manager.ensure_fresh().await.unwrap();
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.current_token(), "a2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_server_lifetime_marks_token_stale() {
        let exchanger = ScriptedExchanger::new(vec![Ok(RefreshedToken {
            access_token: "a1".into(),
            refresh_token: None,
            expires_in: Some(Duration::from_secs(120)),
        })]);
        let manager = TokenManager::new(exchanger, "rt");
        manager.initialize().await.unwrap();
        assert!(!manager.is_stale());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(manager.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_runs_on_cadence_and_stops() {
        let exchanger = ScriptedExchanger::new(vec![token("a1"), token("a2")]);
        let manager = Arc::new(TokenManager::new(exchanger.clone(), "rt"));
        let cancel = CancellationToken::new();

        let handle = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                manager
                    .run_refresh_loop(cancel, Duration::from_secs(60))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.current_token(), "a1");

        cancel.cancel();
        handle.await.unwrap();
    }
}
