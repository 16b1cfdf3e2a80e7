//! Persistent chat session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use twitch_irc::IrcMessage;
use twitch_irc::command::{self, normalize_channel};

use super::listener::ListenerSlot;
use super::{ChannelMembership, ChatConnector, ChatMessage, MessageListener};
use crate::credentials::TokenManager;
use crate::error::{Error, Result};

/// Session tuning.
#[derive(Debug, Clone)]
pub struct ChatSessionConfig {
    /// Bot login used for `NICK`.
    pub username: String,
    /// Cadence of [`ChatSession::run_refresh_loop`].
    pub refresh_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl ChatSessionConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            refresh_interval: Duration::from_secs(60),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
        }
    }
}

struct SessionState {
    channels: HashSet<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Token used for the next authentication.
    token: String,
    cancel: Option<CancellationToken>,
}

enum ReadOutcome {
    Cancelled,
    ReconnectRequested,
    Closed,
}

struct Inner {
    connector: Arc<dyn ChatConnector>,
    tokens: Arc<TokenManager>,
    config: ChatSessionConfig,
    state: Mutex<SessionState>,
    listener: ListenerSlot,
}

/// IRC chat session that keeps a set of joined channels.
///
/// Membership changes and the matching `JOIN`/`PART` are issued under one
/// lock, so the command stream always agrees with [`joined_channels`].
/// Channels joined while disconnected are sent on the next (re)connect.
///
/// [`joined_channels`]: ChatSession::joined_channels
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(
        connector: Arc<dyn ChatConnector>,
        tokens: Arc<TokenManager>,
        config: ChatSessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                tokens,
                config,
                state: Mutex::new(SessionState {
                    channels: HashSet::new(),
                    outbound: None,
                    token: String::new(),
                    cancel: None,
                }),
                listener: ListenerSlot::default(),
            }),
        }
    }

    /// Open the transport, authenticate and join every known channel.
    ///
    /// Connecting an already connected session is a no-op.
    pub async fn connect(&self) -> Result<()> {
        let cancel = {
            let mut state = self.inner.state.lock();
            if state.cancel.as_ref().is_some_and(|c| !c.is_cancelled()) {
                debug!("Chat session already connected");
                return Ok(());
            }
            let current = self.inner.tokens.current_token();
            if !current.is_empty() {
                state.token = current;
            }
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            cancel
        };

        let inbound = match self.inner.establish(&cancel).await {
            Ok(inbound) => inbound,
            Err(e) => {
                cancel.cancel();
                let mut state = self.inner.state.lock();
                if state.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                    state.cancel = None;
                }
                return Err(e);
            }
        };

        tokio::spawn(self.inner.clone().supervise(inbound, cancel));
        Ok(())
    }

    /// Tear the session down. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
            info!("Chat session disconnected");
        }
        state.outbound = None;
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().outbound.is_some()
    }

    /// Add a channel to the membership set. Returns `false` if it was
    /// already joined.
    pub fn join_channel(&self, name: &str) -> bool {
        let channel = normalize_channel(name);
        if channel.is_empty() {
            return false;
        }

        let mut state = self.inner.state.lock();
        if !state.channels.insert(channel.clone()) {
            return false;
        }
        if let Some(outbound) = &state.outbound
            && outbound.send(command::join(&channel)).is_err()
        {
            debug!(channel = %channel, "Transport closed, JOIN deferred to reconnect");
        }
        debug!(channel = %channel, "Joined channel");
        true
    }

    /// Remove a channel from the membership set. Returns `false` if it was
    /// not joined.
    pub fn leave_channel(&self, name: &str) -> bool {
        let channel = normalize_channel(name);

        let mut state = self.inner.state.lock();
        if !state.channels.remove(&channel) {
            return false;
        }
        if let Some(outbound) = &state.outbound {
            let _ = outbound.send(command::part(&channel));
        }
        debug!(channel = %channel, "Left channel");
        true
    }

    pub fn joined_channels(&self) -> HashSet<String> {
        self.inner.state.lock().channels.clone()
    }

    pub fn set_listener(&self, listener: Arc<dyn MessageListener>) {
        self.inner.listener.set(listener);
    }

    pub fn clear_listener(&self) {
        self.inner.listener.clear();
    }

    pub fn has_listener(&self) -> bool {
        self.inner.listener.is_set()
    }

    /// Keep the session's token in step with the credential manager.
    ///
    /// Applies the current token every `refresh_interval` and whenever a
    /// refreshed token is published. The live connection is kept; the token
    /// is used on the next authentication.
    pub async fn run_refresh_loop(&self, cancel: CancellationToken) {
        let period = self.inner.config.refresh_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut updates = self.inner.tokens.subscribe();
        let mut updates_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Chat token refresh loop cancelled");
                    break;
                }
                changed = updates.changed(), if updates_open => match changed {
                    Ok(()) => {
                        let token = updates.borrow_and_update().clone();
                        self.inner.apply_token(token);
                    }
                    Err(_) => updates_open = false,
                },
                _ = ticker.tick() => {
                    self.inner.apply_token(self.inner.tokens.current_token());
                }
            }
        }
    }
}

impl ChannelMembership for ChatSession {
    fn join_channel(&self, name: &str) -> bool {
        ChatSession::join_channel(self, name)
    }

    fn leave_channel(&self, name: &str) -> bool {
        ChatSession::leave_channel(self, name)
    }

    fn joined_channels(&self) -> HashSet<String> {
        ChatSession::joined_channels(self)
    }
}

impl Inner {
    fn apply_token(&self, token: String) {
        if token.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        if state.token != token {
            state.token = token;
            debug!("Chat session token updated");
        }
    }

    fn send_raw(&self, line: String) {
        if let Some(outbound) = &self.state.lock().outbound {
            let _ = outbound.send(line);
        }
    }

    /// Connect, authenticate and attach the transport.
    async fn establish(&self, cancel: &CancellationToken) -> Result<mpsc::Receiver<String>> {
        let token = self.state.lock().token.clone();
        let conn = self.connector.connect().await?;

        for line in [
            command::cap_req(),
            command::pass(&token),
            command::nick(&self.config.username),
        ] {
            conn.outbound
                .send(line)
                .map_err(|_| Error::connection("transport closed during handshake"))?;
        }

        let mut state = self.state.lock();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        for channel in &state.channels {
            let _ = conn.outbound.send(command::join(channel));
        }
        info!(
            username = %self.config.username,
            channels = state.channels.len(),
            "Chat session connected"
        );
        state.outbound = Some(conn.outbound);
        Ok(conn.inbound)
    }

    fn detach(&self, cancel: &CancellationToken) {
        let mut state = self.state.lock();
        if !cancel.is_cancelled() {
            state.outbound = None;
        }
    }

    async fn supervise(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) {
        loop {
            let outcome = self.read_loop(&mut inbound, &cancel).await;
            self.detach(&cancel);
            match outcome {
                ReadOutcome::Cancelled => break,
                ReadOutcome::ReconnectRequested => info!("Chat server requested reconnect"),
                ReadOutcome::Closed => warn!("Chat connection lost"),
            }

            match self.reconnect(&cancel).await {
                Some(next) => inbound = next,
                None => break,
            }
        }
        debug!("Chat session supervisor stopped");
    }

    async fn read_loop(
        &self,
        inbound: &mut mpsc::Receiver<String>,
        cancel: &CancellationToken,
    ) -> ReadOutcome {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ReadOutcome::Cancelled,
                frame = inbound.recv() => frame,
            };
            let Some(frame) = frame else {
                return ReadOutcome::Closed;
            };

            for parsed in IrcMessage::parse_frame(&frame) {
                let msg = match parsed {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, "Skipping malformed IRC line");
                        continue;
                    }
                };

                match msg.command.as_str() {
                    "PING" => self.send_raw(command::pong(msg.trailing())),
                    "PRIVMSG" => {
                        if let Some(chat) = ChatMessage::from_irc(&msg) {
                            self.listener.dispatch(chat).await;
                        }
                    }
                    "RECONNECT" => return ReadOutcome::ReconnectRequested,
                    "001" => info!("Chat session authenticated"),
                    "NOTICE" => {
                        let text = msg.trailing().unwrap_or_default();
                        if text.contains("Login authentication failed")
                            || text.contains("Improperly formatted auth")
                        {
                            warn!(notice = %text, "Chat authentication notice");
                        } else {
                            debug!(channel = ?msg.channel(), notice = %text, "Chat notice");
                        }
                    }
                    _ => trace!(command = %msg.command, "Unhandled IRC command"),
                }
            }
        }
    }

    /// Reconnect with exponential backoff. `None` once cancelled.
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<mpsc::Receiver<String>> {
        let mut backoff = self.config.backoff_initial;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(backoff) => {}
            }

            match self.establish(cancel).await {
                Ok(inbound) => return Some(inbound),
                Err(Error::Cancelled) => return None,
                Err(e) => {
                    backoff = (backoff * 2).min(self.config.backoff_max);
                    warn!(error = %e, retry_in = ?backoff, "Chat reconnect failed");
                }
            }
        }
    }
}
