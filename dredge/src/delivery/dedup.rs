//! TTL-bounded identity cache.

use std::time::Duration;

use moka::sync::Cache;

/// Default time an identity is remembered.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default cap on remembered identities.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Remembers identities for a fixed TTL.
///
/// Backed by a moka cache: entries expire `ttl` after insertion and the cache
/// evicts once `max_entries` is exceeded, which can let an early repeat
/// through.
#[derive(Clone)]
pub struct DedupCache {
    seen: Cache<String, ()>,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl DedupCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries.max(1) as u64)
                .build(),
        }
    }

    /// Record `id` as seen.
    ///
    /// Returns `true` if it was not seen within the TTL and should be
    /// forwarded.
    pub fn first_seen(&self, id: &str) -> bool {
        if self.seen.contains_key(id) {
            return false;
        }
        self.seen.insert(id.to_string(), ());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    /// Approximate number of remembered identities.
    pub fn len(&self) -> u64 {
        self.seen.run_pending_tasks();
        self.seen.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
