use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::address::{HostPort, Location};

static CORRELATION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier attached to one dispatched request and its registry lookups.
///
/// Only used for tracing and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn generate() -> Self {
        // Upper 32 bits from the clock, lower 32 bits from a process-wide counter
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let counter = CORRELATION_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

        Self((timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for CorrelationId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Which registry table a lookup targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupScope {
    /// Logical service names (the normal case)
    #[default]
    Service,
    /// Individual instance names
    Instance,
}

impl LookupScope {
    /// Registry path serving this scope.
    pub fn path(&self) -> &'static str {
        match self {
            LookupScope::Service => "/services/resolve",
            LookupScope::Instance => "/instances/resolve",
        }
    }
}

/// A single lookup sent to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveQuery {
    pub host: String,
    pub port: u16,
    pub deployment_id: String,
    pub location: Location,
    pub correlation_id: CorrelationId,
    #[serde(skip)]
    pub scope: LookupScope,
}

impl ResolveQuery {
    /// Builds a service-scope query, deriving the deployment id from the host.
    pub fn new(logical: &HostPort, location: Location, correlation_id: CorrelationId) -> Self {
        Self {
            host: logical.host.clone(),
            port: logical.port,
            deployment_id: logical.deployment_id().to_string(),
            location,
            correlation_id,
            scope: LookupScope::Service,
        }
    }

    pub fn with_scope(mut self, scope: LookupScope) -> Self {
        self.scope = scope;
        self
    }

    /// The logical address this query asks about.
    pub fn logical(&self) -> HostPort {
        HostPort::new(self.host.clone(), self.port)
    }
}
