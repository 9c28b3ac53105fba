use http::request::Parts;
use http::uri::Authority;
use hyper::body::Bytes;
use hyper::{Request, Uri};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};
use waypoint_common::protocol::error::{Result, WaypointError};
use waypoint_common::protocol::{CorrelationId, Phase};
use waypoint_common::{HostPort, Location};

use crate::cache::AddressCache;
use crate::middleware::{MiddlewareRegistry, RequestView};
use crate::resolver::{Resolution, Resolver};
use crate::transport::{HttpRequest, HttpResponse, Transport};

/// Resolves, rewrites and sends requests.
///
/// # Request Flow
///
/// 1. before-resolution observers see the request as built by the caller
/// 2. the destination is taken from the cache, or resolved and cached
/// 3. the URI authority is replaced by the resolved address
/// 4. after-resolution observers see the rewritten request
/// 5. the request is sent
///
/// A send that times out or finds the address unreachable is retried once,
/// with a fresh resolution, but only when the address came from the cache:
/// a cached address may have moved since it was stored. The outcome of that
/// retry is final. Observers do not fire again for it.
pub struct Dispatcher {
    cache: Arc<AddressCache>,
    resolver: Resolver,
    middleware: Arc<MiddlewareRegistry>,
    transport: Arc<dyn Transport>,
    location: Arc<RwLock<Location>>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<AddressCache>,
        resolver: Resolver,
        middleware: Arc<MiddlewareRegistry>,
        transport: Arc<dyn Transport>,
        location: Arc<RwLock<Location>>,
    ) -> Self {
        Self {
            cache,
            resolver,
            middleware,
            transport,
            location,
        }
    }

    pub async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let correlation_id = CorrelationId::generate();
        let logical = HostPort::from_uri(request.uri())?;

        self.middleware
            .fire(Phase::BeforeResolution, correlation_id, RequestView::new(&request));

        let (resolved, using_cache) = self.destination(&logical, correlation_id).await?;

        let (parts, body) = request.into_parts();
        let outgoing = rewrite(&parts, &body, &resolved)?;

        self.middleware
            .fire(Phase::AfterResolution, correlation_id, RequestView::new(&outgoing));

        let err = match self.transport.send(outgoing).await {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };

        if !(err.is_retriable() && using_cache) {
            return Err(WaypointError::Send(err));
        }

        warn!(
            correlation_id = %correlation_id,
            "Cached address {} for {} failed ({}), retrying with a fresh resolution",
            resolved, logical, err.kind
        );

        self.cache.invalidate(&logical);
        let resolution = self.resolve_fresh(&logical, correlation_id).await?;
        let retry = rewrite(&parts, &body, resolution.address())?;

        self.transport.send(retry).await.map_err(WaypointError::Send)
    }

    /// Cached address if any, otherwise a fresh resolution.
    ///
    /// The flag reports whether the address came from the cache.
    async fn destination(
        &self,
        logical: &HostPort,
        correlation_id: CorrelationId,
    ) -> Result<(HostPort, bool)> {
        if let Some(cached) = self.cache.lookup(logical) {
            debug!(logical = %logical, resolved = %cached.address, stale = cached.stale, "Cache hit");
            return Ok((cached.address, true));
        }

        debug!(logical = %logical, "Cache miss");
        let resolution = self.resolve_fresh(logical, correlation_id).await?;
        Ok((resolution.into_address(), false))
    }

    async fn resolve_fresh(
        &self,
        logical: &HostPort,
        correlation_id: CorrelationId,
    ) -> Result<Resolution> {
        let location = self.location.read().clone();
        let resolution = self.resolver.resolve(logical, &location, correlation_id).await?;

        if let Resolution::Found(resolved) = &resolution {
            self.cache.store(logical.clone(), resolved.clone());
        }

        Ok(resolution)
    }
}

/// Rebuilds a request aimed at `resolved`.
///
/// Method, scheme, path, query, version, headers and body are kept;
/// extensions are not carried over.
pub fn rewrite(parts: &Parts, body: &Bytes, resolved: &HostPort) -> Result<HttpRequest> {
    let mut request = Request::new(body.clone());
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = rewrite_uri(&parts.uri, resolved)?;
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    Ok(request)
}

/// Replaces the authority of `uri` with `resolved`.
pub fn rewrite_uri(uri: &Uri, resolved: &HostPort) -> Result<Uri> {
    let mut parts = uri.clone().into_parts();
    parts.authority = Some(resolved.to_string().parse::<Authority>()?);

    Uri::from_parts(parts).map_err(|e| WaypointError::MalformedDestination(e.to_string()))
}
