//! Discovery loop and membership reconciliation.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use twitch_irc::command::normalize_channel;

use super::retry::retry_fixed;
use super::{LiveStreamSource, StreamRecord};
use crate::chat::ChannelMembership;
use crate::config::DiscoveryConfig;
use crate::{Error, Result};

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Channels left, sorted.
    pub left: Vec<String>,
    /// Channels joined, sorted.
    pub joined: Vec<String>,
    /// Size of the new live set.
    pub live: usize,
}

/// Keeps the chat membership equal to the set of live channels.
pub struct LiveSetDiscovery {
    source: Arc<dyn LiveStreamSource>,
    membership: Arc<dyn ChannelMembership>,
    config: DiscoveryConfig,
    permanent: HashSet<String>,
    /// Live set applied by the last successful cycle.
    previous: Mutex<HashSet<String>>,
}

impl LiveSetDiscovery {
    pub fn new(
        source: Arc<dyn LiveStreamSource>,
        membership: Arc<dyn ChannelMembership>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            source,
            membership,
            config,
            permanent: HashSet::new(),
            previous: Mutex::new(HashSet::new()),
        }
    }

    /// Channels that stay joined whether or not they are live.
    pub fn with_permanent_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.permanent = channels
            .into_iter()
            .map(|c| normalize_channel(c.as_ref()))
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    /// Snapshot of the last applied live set.
    pub fn live_set(&self) -> HashSet<String> {
        self.previous.lock().clone()
    }

    /// Walk every page of the listing.
    ///
    /// Each page is retried independently; an exhausted page fails the whole
    /// walk. Records of the final (cursor-less) page are included.
    pub async fn fetch_live_streams(&self, cancel: &CancellationToken) -> Result<Vec<StreamRecord>> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page_index = 0usize;

        loop {
            if page_index > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.config.page_delay()) => {}
                }
            }

            let page = retry_fixed(
                "fetch live streams page",
                self.config.retry_attempts as usize,
                self.config.retry_delay(),
                cancel,
                || self.source.fetch_page(cursor.as_deref()),
            )
            .await?;

            records.extend(page.logins.into_iter().map(|login| StreamRecord {
                login,
                page: page_index,
            }));

            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            page_index += 1;
        }

        Ok(records)
    }

    /// Apply `current` as the new live set.
    ///
    /// Leaves are issued before joins; channels present in both sets are
    /// untouched. The stored set is replaced only after every command has
    /// been issued.
    pub fn reconcile(&self, current: HashSet<String>) -> ReconcileSummary {
        let mut previous = self.previous.lock();

        let mut left: Vec<String> = previous.difference(&current).cloned().collect();
        let mut joined: Vec<String> = current.difference(&previous).cloned().collect();
        left.sort();
        joined.sort();

        for channel in &left {
            self.membership.leave_channel(channel);
        }
        for channel in &joined {
            self.membership.join_channel(channel);
        }

        let live = current.len();
        *previous = current;

        ReconcileSummary { left, joined, live }
    }

    /// Fetch the listing and reconcile membership against it.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<ReconcileSummary> {
        let started = Instant::now();
        let records = self.fetch_live_streams(cancel).await?;
        let pages = records.last().map_or(0, |r| r.page + 1);

        let mut current: HashSet<String> = records
            .into_iter()
            .map(|r| normalize_channel(&r.login))
            .filter(|c| !c.is_empty())
            .collect();
        current.extend(self.permanent.iter().cloned());

        debug!(
            duration = ?started.elapsed(),
            pages,
            count = current.len(),
            "Live streams fetched"
        );

        Ok(self.reconcile(current))
    }

    /// Run a cycle now and then every `interval` until cancelled.
    pub async fn run_fetch_loop(&self, cancel: CancellationToken) {
        info!(
            interval = ?self.config.interval(),
            permanent = self.permanent.len(),
            "Live-set discovery started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_cycle(&cancel).await {
                Ok(summary) => info!(
                    live = summary.live,
                    joined = summary.joined.len(),
                    left = summary.left.len(),
                    "Live-set discovery cycle complete"
                ),
                Err(Error::Cancelled) => break,
                Err(e) => warn!(error = %e, "Live-set discovery cycle failed"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval()) => {}
            }
        }

        debug!("Live-set discovery stopped");
    }
}
