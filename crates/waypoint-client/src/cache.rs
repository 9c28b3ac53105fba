use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use waypoint_common::HostPort;

/// A resolved address plus its staleness marker.
///
/// The resolved address never changes once the entry exists; a new
/// resolution replaces the whole entry. Only the stale flag is mutated, by
/// the entry's expiry timer.
#[derive(Debug)]
pub struct CacheEntry {
    resolved: HostPort,
    stale: AtomicBool,
}

impl CacheEntry {
    fn new(resolved: HostPort) -> Self {
        Self {
            resolved,
            stale: AtomicBool::new(false),
        }
    }

    pub fn resolved(&self) -> &HostPort {
        &self.resolved
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }
}

/// Snapshot returned by [`AddressCache::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAddress {
    pub address: HostPort,
    pub stale: bool,
}

/// Concurrent map from logical address to its last successful resolution.
///
/// # Entry Lifecycle
///
/// - `store` creates a fresh entry and arms a one-shot timer
/// - after `expiry` the timer marks the entry stale; it stays usable
/// - the next [`sweep_stale`](Self::sweep_stale) removes it
/// - [`invalidate`](Self::invalidate) removes an entry immediately
///
/// Staleness only decides eviction eligibility, never lookup validity, so an
/// expiring entry does not cause a burst of registry lookups.
///
/// # Thread Safety
///
/// Backed by a sharded `DashMap`: operations on unrelated keys do not
/// contend on a single lock.
pub struct AddressCache {
    entries: DashMap<HostPort, Arc<CacheEntry>>,
    expiry: Duration,
}

impl AddressCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            expiry,
        }
    }

    /// Returns the cached resolution for `key`, stale or not.
    pub fn lookup(&self, key: &HostPort) -> Option<CachedAddress> {
        self.entries.get(key).map(|entry| CachedAddress {
            address: entry.resolved().clone(),
            stale: entry.is_stale(),
        })
    }

    /// Stores a fresh entry for `key`, replacing any existing one.
    ///
    /// The expiry timer runs on the current tokio runtime. Outside a runtime
    /// the entry never turns stale and only leaves through `invalidate`.
    pub fn store(&self, key: HostPort, resolved: HostPort) {
        let entry = Arc::new(CacheEntry::new(resolved));
        let timer_target = Arc::downgrade(&entry);

        tracing::debug!(logical = %key, resolved = %entry.resolved(), "Caching resolution");
        self.entries.insert(key, entry);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(expire_after(self.expiry, timer_target));
            }
            Err(_) => {
                tracing::warn!("No tokio runtime, cache entry will not expire");
            }
        }
    }

    /// Removes the entry for `key`, returning whether one existed.
    pub fn invalidate(&self, key: &HostPort) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            tracing::debug!(logical = %key, "Invalidated cache entry");
        }
        removed
    }

    /// Removes every stale entry and returns the evicted keys.
    ///
    /// An entry replaced by a concurrent `store` between the scan and the
    /// removal is fresh and survives.
    pub fn sweep_stale(&self) -> Vec<HostPort> {
        let candidates: Vec<HostPort> = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_stale())
            .map(|entry| entry.key().clone())
            .collect();

        candidates
            .into_iter()
            .filter(|key| {
                self.entries
                    .remove_if(key, |_, entry| entry.is_stale())
                    .is_some()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }
}

async fn expire_after(expiry: Duration, entry: Weak<CacheEntry>) {
    tokio::time::sleep(expiry).await;

    // Replaced or evicted entries are already gone
    if let Some(entry) = entry.upgrade() {
        entry.mark_stale();
    }
}
