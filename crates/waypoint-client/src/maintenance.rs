use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::AddressCache;
use crate::registry::RegistryEndpoint;

/// Periodically evicts stale cache entries.
pub struct EvictionSweeper {
    cache: Arc<AddressCache>,
    interval: Duration,
}

impl EvictionSweeper {
    pub fn new(cache: Arc<AddressCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    /// Starts the sweep task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            self.sweep();
        }
    }

    fn sweep(&self) {
        let evicted = self.cache.sweep_stale();
        if evicted.is_empty() {
            debug!("Eviction sweep found no stale entries");
            return;
        }

        info!(
            "Evicted {} stale cache entries, {} remaining",
            evicted.len(),
            self.cache.len()
        );
    }
}

/// Periodically points registry lookups back at the fallback endpoint,
/// discarding any endpoint learned from redirects.
pub struct FallbackReset {
    endpoint: Arc<RegistryEndpoint>,
    interval: Duration,
}

impl FallbackReset {
    pub fn new(endpoint: Arc<RegistryEndpoint>, interval: Duration) -> Self {
        Self { endpoint, interval }
    }

    /// Starts the reset task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            interval.tick().await;
            if self.endpoint.reset_to_fallback() {
                info!(fallback = %self.endpoint.fallback(), "Restored fallback registry endpoint");
            }
        }
    }
}
