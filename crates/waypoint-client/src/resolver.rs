use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use waypoint_common::protocol::error::{Result, WaypointError};
use waypoint_common::protocol::{CorrelationId, LookupScope, ResolveQuery};
use waypoint_common::{HostPort, Location};

use crate::config::ResolveRetryConfig;
use crate::registry::{Registry, RegistryEndpoint, RegistryStatus};

/// Final outcome of resolving a logical address.
///
/// `NotFound` and `TimedOut` carry the original logical address: the request
/// goes out to it unchanged and nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(HostPort),
    NotFound(HostPort),
    TimedOut(HostPort),
}

impl Resolution {
    /// The address the request should be sent to.
    pub fn address(&self) -> &HostPort {
        match self {
            Resolution::Found(addr) | Resolution::NotFound(addr) | Resolution::TimedOut(addr) => addr,
        }
    }

    pub fn into_address(self) -> HostPort {
        match self {
            Resolution::Found(addr) | Resolution::NotFound(addr) | Resolution::TimedOut(addr) => addr,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Resolves logical addresses through a [`Registry`] with bounded retry.
///
/// # Retry Behavior
///
/// - registry timeouts back off linearly and retry, up to
///   `max_attempts` lookups in total
/// - a redirect moves the shared [`RegistryEndpoint`] and retries at once;
///   it counts as an attempt
/// - not-found and found answers end the lookup immediately
/// - failure statuses and an unreachable registry are returned as errors
///
/// When attempts run out the last outcome is accepted: the logical address
/// is used unresolved.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<dyn Registry>,
    endpoint: Arc<RegistryEndpoint>,
    retry: ResolveRetryConfig,
}

impl Resolver {
    pub fn new(
        registry: Arc<dyn Registry>,
        endpoint: Arc<RegistryEndpoint>,
        retry: ResolveRetryConfig,
    ) -> Self {
        Self {
            registry,
            endpoint,
            retry,
        }
    }

    pub fn endpoint(&self) -> &Arc<RegistryEndpoint> {
        &self.endpoint
    }

    /// Resolves `logical` for a caller at `location`.
    pub async fn resolve(
        &self,
        logical: &HostPort,
        location: &Location,
        correlation_id: CorrelationId,
    ) -> Result<Resolution> {
        let query = ResolveQuery::new(logical, location.clone(), correlation_id);
        let resolution = self.resolve_scope(&query).await?;

        if self.retry.instance_fallback && matches!(resolution, Resolution::NotFound(_)) {
            debug!(
                logical = %logical,
                correlation_id = %correlation_id,
                "Service lookup missed, trying instance scope"
            );
            return self
                .resolve_scope(&query.with_scope(LookupScope::Instance))
                .await;
        }

        Ok(resolution)
    }

    async fn resolve_scope(&self, query: &ResolveQuery) -> Result<Resolution> {
        let logical = query.logical();
        let started = Instant::now();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let endpoint = self.endpoint.active();

            match self.registry.lookup(&endpoint, query).await? {
                RegistryStatus::Found(resolved) => {
                    debug!(logical = %logical, resolved = %resolved, "Resolved address");
                    return Ok(Resolution::Found(resolved));
                }
                RegistryStatus::NotFound => {
                    debug!(logical = %logical, "Registry does not know address, using it as-is");
                    return Ok(Resolution::NotFound(logical));
                }
                RegistryStatus::Failed(status) => {
                    return Err(WaypointError::RegistryStatus {
                        status,
                        address: logical,
                        correlation_id: query.correlation_id,
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
                RegistryStatus::TimedOut => {
                    if attempt >= max_attempts {
                        warn!(
                            "Registry timed out {} times resolving {}, using it unresolved",
                            attempt, logical
                        );
                        return Ok(Resolution::TimedOut(logical));
                    }

                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        "Registry lookup for {} timed out (attempt {}/{}), retrying in {:?}",
                        logical, attempt, max_attempts, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                RegistryStatus::Redirect(target) => {
                    info!(from = %endpoint, to = %target, "Registry redirected lookups");
                    self.endpoint.redirect(target);

                    if attempt >= max_attempts {
                        warn!(
                            "Registry kept redirecting after {} attempts resolving {}, using it unresolved",
                            attempt, logical
                        );
                        return Ok(Resolution::TimedOut(logical));
                    }
                }
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Replays scripted outcomes and records every lookup it receives.
    struct ScriptedRegistry {
        script: Mutex<VecDeque<Result<RegistryStatus>>>,
        seen: Mutex<Vec<(HostPort, ResolveQuery, Instant)>>,
    }

    impl ScriptedRegistry {
        fn new(script: Vec<Result<RegistryStatus>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().len()
        }
    }

    #[async_trait]
    impl Registry for ScriptedRegistry {
        async fn lookup(&self, endpoint: &HostPort, query: &ResolveQuery) -> Result<RegistryStatus> {
            self.seen
                .lock()
                .push((endpoint.clone(), query.clone(), Instant::now()));
            self.script
                .lock()
                .pop_front()
                .unwrap_or(Ok(RegistryStatus::TimedOut))
        }
    }

    fn fallback() -> HostPort {
        HostPort::new("10.9.0.1", 50000)
    }

    fn resolver(registry: Arc<ScriptedRegistry>, retry: ResolveRetryConfig) -> Resolver {
        Resolver::new(registry, Arc::new(RegistryEndpoint::new(fallback())), retry)
    }

    fn svc() -> HostPort {
        HostPort::new("orders-service-3", 8080)
    }

    #[tokio::test]
    async fn test_found() {
        let registry = ScriptedRegistry::new(vec![Ok(RegistryStatus::Found(HostPort::new("10.0.0.5", 8080)))]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let resolution = resolver
            .resolve(&svc(), &Location::new("cell-1"), CorrelationId::from(1))
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Found(HostPort::new("10.0.0.5", 8080)));
        assert_eq!(registry.calls(), 1);

        let (endpoint, query, _) = registry.seen.lock()[0].clone();
        assert_eq!(endpoint, fallback());
        assert_eq!(query.deployment_id, "orders");
        assert_eq!(query.location, Location::new("cell-1"));
        assert_eq!(query.scope, LookupScope::Service);
    }

    #[tokio::test]
    async fn test_not_found_passes_through() {
        let registry = ScriptedRegistry::new(vec![Ok(RegistryStatus::NotFound)]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let resolution = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::NotFound(svc()));
        assert_eq!(resolution.address(), &svc());
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_exactly_max_attempts() {
        let registry = ScriptedRegistry::new(vec![]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let started = Instant::now();
        let resolution = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::TimedOut(svc()));
        assert_eq!(registry.calls(), 5);

        // 1 + 2 + 3 + 4 seconds between the five attempts
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        let seen = registry.seen.lock();
        let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1].2 - w[0].2).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(4),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_timeouts() {
        let registry = ScriptedRegistry::new(vec![
            Ok(RegistryStatus::TimedOut),
            Ok(RegistryStatus::TimedOut),
            Ok(RegistryStatus::Found(HostPort::new("10.0.0.5", 8080))),
        ]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let resolution = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap();

        assert!(resolution.is_found());
        assert_eq!(registry.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_status_is_an_error() {
        let registry = ScriptedRegistry::new(vec![Ok(RegistryStatus::Failed(500))]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let err = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(77))
            .await
            .unwrap_err();

        match err {
            WaypointError::RegistryStatus {
                status,
                address,
                correlation_id,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(address, svc());
                assert_eq!(correlation_id, CorrelationId::from(77));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_not_retried() {
        let registry = ScriptedRegistry::new(vec![Err(WaypointError::RegistryUnavailable(
            "connection refused".into(),
        ))]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let err = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap_err();

        assert!(matches!(err, WaypointError::RegistryUnavailable(_)));
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test]
    async fn test_redirect_moves_endpoint_and_retries() {
        let redirected = HostPort::new("10.9.0.2", 50000);
        let registry = ScriptedRegistry::new(vec![
            Ok(RegistryStatus::Redirect(redirected.clone())),
            Ok(RegistryStatus::Found(HostPort::new("10.0.0.5", 8080))),
        ]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let resolution = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap();

        assert!(resolution.is_found());
        assert_eq!(resolver.endpoint().active(), redirected);

        let seen = registry.seen.lock();
        assert_eq!(seen[0].0, fallback());
        assert_eq!(seen[1].0, redirected);
    }

    #[tokio::test]
    async fn test_instance_fallback_disabled_by_default() {
        let registry = ScriptedRegistry::new(vec![
            Ok(RegistryStatus::NotFound),
            Ok(RegistryStatus::Found(HostPort::new("10.0.0.5", 8080))),
        ]);
        let resolver = resolver(registry.clone(), ResolveRetryConfig::default());

        let resolution = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::NotFound(svc()));
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test]
    async fn test_instance_fallback_lookup() {
        let registry = ScriptedRegistry::new(vec![
            Ok(RegistryStatus::NotFound),
            Ok(RegistryStatus::Found(HostPort::new("10.0.0.5", 8080))),
        ]);
        let retry = ResolveRetryConfig {
            instance_fallback: true,
            ..Default::default()
        };
        let resolver = resolver(registry.clone(), retry);

        let resolution = resolver
            .resolve(&svc(), &Location::default(), CorrelationId::from(1))
            .await
            .unwrap();

        assert_eq!(resolution, Resolution::Found(HostPort::new("10.0.0.5", 8080)));

        let seen = registry.seen.lock();
        assert_eq!(seen[0].1.scope, LookupScope::Service);
        assert_eq!(seen[1].1.scope, LookupScope::Instance);
    }
}
