//! Registry lookups.
//!
//! A [`Registry`] performs exactly one lookup against one endpoint and
//! reports what happened; the retry policy lives in
//! [`Resolver`](crate::resolver::Resolver). The endpoint being queried is
//! shared state ([`RegistryEndpoint`]): registry redirects move it, the
//! fallback-reset loop puts it back.

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::StatusCode;
use parking_lot::RwLock;
use std::time::Duration;
use waypoint_common::protocol::error::{Result, WaypointError};
use waypoint_common::protocol::ResolveQuery;
use waypoint_common::transport::http::HttpTransport;
use waypoint_common::HostPort;

use crate::transport::{build_http_client, HttpClient};

/// Outcome of a single registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryStatus {
    /// The registry knows the address
    Found(HostPort),
    /// The registry does not know the address
    NotFound,
    /// The registry timed out or is overloaded; worth retrying
    TimedOut,
    /// Ask another registry endpoint instead
    Redirect(HostPort),
    /// Any other failure status
    Failed(u16),
}

impl RegistryStatus {
    /// Maps a registry HTTP status onto a lookup outcome.
    ///
    /// `200` and the redirect codes carry data the caller still has to read,
    /// so they map to placeholders here: `Found` must be built from the body
    /// and `Redirect` from the `Location` header.
    pub fn classify(status: StatusCode) -> StatusClass {
        match status {
            StatusCode::OK => StatusClass::Found,
            StatusCode::NOT_FOUND => StatusClass::Final(RegistryStatus::NotFound),
            StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => StatusClass::Final(RegistryStatus::TimedOut),
            StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => StatusClass::Redirect,
            other => StatusClass::Final(RegistryStatus::Failed(other.as_u16())),
        }
    }
}

/// Result of [`RegistryStatus::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusClass {
    Found,
    Redirect,
    Final(RegistryStatus),
}

/// One lookup against one registry endpoint.
///
/// Implementations report registry-side conditions through
/// [`RegistryStatus`] and reserve `Err` for not reaching the registry at all
/// or not understanding its answer.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn lookup(&self, endpoint: &HostPort, query: &ResolveQuery) -> Result<RegistryStatus>;
}

/// The registry endpoint currently queried, plus the fallback it resets to.
#[derive(Debug)]
pub struct RegistryEndpoint {
    active: RwLock<HostPort>,
    fallback: HostPort,
}

impl RegistryEndpoint {
    /// Starts out pointing at `fallback`.
    pub fn new(fallback: HostPort) -> Self {
        Self {
            active: RwLock::new(fallback.clone()),
            fallback,
        }
    }

    pub fn active(&self) -> HostPort {
        self.active.read().clone()
    }

    pub fn fallback(&self) -> &HostPort {
        &self.fallback
    }

    /// Points subsequent lookups at `target`.
    pub fn redirect(&self, target: HostPort) {
        *self.active.write() = target;
    }

    /// Restores the fallback endpoint, returning whether it had moved away.
    pub fn reset_to_fallback(&self) -> bool {
        let mut active = self.active.write();
        if *active == self.fallback {
            return false;
        }
        *active = self.fallback.clone();
        true
    }
}

/// [`Registry`] speaking the JSON-over-HTTP lookup protocol.
#[derive(Clone)]
pub struct HttpRegistry {
    client: HttpClient,
    timeout: Duration,
}

impl HttpRegistry {
    /// Creates a registry client; a lookup exceeding `timeout` reports
    /// [`RegistryStatus::TimedOut`].
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(build_http_client(timeout), timeout)
    }

    pub fn with_client(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn lookup(&self, endpoint: &HostPort, query: &ResolveQuery) -> Result<RegistryStatus> {
        let request = HttpTransport::build_resolve_request(endpoint, query)?;

        let exchange = async {
            let response = self.client.request(request).await.map_err(|e| {
                WaypointError::RegistryUnavailable(format!("{}: {}", endpoint, e))
            })?;

            match RegistryStatus::classify(response.status()) {
                StatusClass::Final(status) => Ok::<_, WaypointError>(status),
                StatusClass::Redirect => {
                    HttpTransport::redirect_target(&response).map(RegistryStatus::Redirect)
                }
                StatusClass::Found => {
                    let body = response
                        .into_body()
                        .collect()
                        .await
                        .map_err(|e| {
                            WaypointError::InvalidResponse(format!("failed to read registry reply: {}", e))
                        })?
                        .to_bytes();

                    let reply = HttpTransport::parse_resolve_reply(&body)?;
                    Ok(RegistryStatus::Found(reply.address()))
                }
            }
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(status) => status,
            Err(_) => {
                tracing::debug!(
                    endpoint = %endpoint,
                    correlation_id = %query.correlation_id,
                    "Registry lookup exceeded {:?}",
                    self.timeout
                );
                Ok(RegistryStatus::TimedOut)
            }
        }
    }
}
