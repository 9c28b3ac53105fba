use std::time::Duration;
use waypoint_common::protocol::error::{Result, WaypointError};
use waypoint_common::HostPort;

/// Environment variable naming the fallback registry endpoint (`host:port`).
pub const FALLBACK_ENV: &str = "WAYPOINT_REGISTRY_FALLBACK";

/// Retry policy for registry lookups.
///
/// A lookup the registry reports as timed out (or overloaded) is retried up
/// to `max_attempts` times in total, sleeping `backoff_step * attempt`
/// between attempts: 1s, 2s, 3s, 4s with the defaults. Once attempts are
/// exhausted the last outcome is accepted as-is.
#[derive(Debug, Clone)]
pub struct ResolveRetryConfig {
    /// Total lookup attempts, including the first
    ///
    /// Default: 5
    pub max_attempts: u32,
    /// Linear backoff unit
    ///
    /// Default: 1s
    pub backoff_step: Duration,
    /// Issue an instance-scope lookup when the service scope reports not-found
    ///
    /// Default: false
    pub instance_fallback: bool,
}

impl Default for ResolveRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(1),
            instance_fallback: false,
        }
    }
}

impl ResolveRetryConfig {
    /// Sleep before the attempt following `attempt` (1-based).
    // No sleep follows the final attempt: the default worst case is 1+2+3+4 = 10s.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

/// Client configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long a cache entry stays fresh before it becomes eligible for eviction
    pub cache_expiry: Duration,
    /// Period of the stale-entry eviction sweep
    pub eviction_interval: Duration,
    /// Period of the registry endpoint reset to the fallback address
    pub fallback_reset_interval: Duration,
    /// Upper bound for one request, including reading the response body
    pub send_timeout: Duration,
    /// Upper bound for one registry lookup; exceeding it counts as a registry timeout
    pub registry_timeout: Duration,
    /// Registry lookup retry policy
    pub resolve: ResolveRetryConfig,
    /// Fallback registry endpoint; read from [`FALLBACK_ENV`] when `None`
    pub fallback: Option<HostPort>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_expiry: Duration::from_secs(60),
            eviction_interval: Duration::from_secs(30),
            fallback_reset_interval: Duration::from_secs(120),
            send_timeout: Duration::from_secs(30),
            registry_timeout: Duration::from_secs(5),
            resolve: ResolveRetryConfig::default(),
            fallback: None,
        }
    }
}

impl ClientConfig {
    /// Sets an explicit fallback endpoint instead of reading the environment.
    pub fn with_fallback(mut self, fallback: HostPort) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// The configured fallback, or the one named by [`FALLBACK_ENV`].
    pub fn resolve_fallback(&self) -> Result<HostPort> {
        match &self.fallback {
            Some(fallback) => Ok(fallback.clone()),
            None => Self::fallback_from_env(),
        }
    }

    /// Reads the fallback registry endpoint from the process environment.
    ///
    /// A missing or malformed value is a configuration error.
    pub fn fallback_from_env() -> Result<HostPort> {
        let raw = std::env::var(FALLBACK_ENV).map_err(|_| {
            WaypointError::Configuration(format!("{} is not set", FALLBACK_ENV))
        })?;

        raw.trim().parse::<HostPort>().map_err(|e| {
            WaypointError::Configuration(format!("{} is not a host:port ({}): {}", FALLBACK_ENV, raw, e))
        })
    }
}
