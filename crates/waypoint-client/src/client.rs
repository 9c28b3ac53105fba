use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use url::form_urlencoded;
use waypoint_common::protocol::error::{Result, WaypointError};
use waypoint_common::protocol::{CorrelationId, Phase};
use waypoint_common::{HostPort, Location};

use crate::cache::AddressCache;
use crate::config::ClientConfig;
use crate::dispatcher::Dispatcher;
use crate::maintenance::{EvictionSweeper, FallbackReset};
use crate::middleware::{MiddlewareRegistry, RequestView};
use crate::registry::{HttpRegistry, Registry, RegistryEndpoint};
use crate::resolver::Resolver;
use crate::transport::{HttpRequest, HttpResponse, HyperTransport, Transport};

/// A client that is not ready to send yet.
///
/// Middleware can be registered before initialization; sending requires
/// [`init`](Self::init), which produces a [`WaypointClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    middleware: MiddlewareRegistry,
    transport: Option<Arc<dyn Transport>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            middleware: MiddlewareRegistry::new(),
            transport: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replaces the default hyper transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// See [`MiddlewareRegistry::register`].
    pub fn register_middleware<F>(&self, id: impl Into<String>, callback: F, phase: Phase) -> Result<()>
    where
        F: Fn(CorrelationId, RequestView) + Send + Sync + 'static,
    {
        self.middleware.register(id, callback, phase)
    }

    /// Initializes the client against `registry`.
    ///
    /// Reads the fallback registry endpoint (from the config or the
    /// environment) and starts the eviction and fallback-reset loops on the
    /// current tokio runtime. Both loops stop when the last client handle
    /// is dropped.
    pub fn init(self, registry: Arc<dyn Registry>, location: impl Into<Location>) -> Result<WaypointClient> {
        let fallback = self.config.resolve_fallback()?;

        tokio::runtime::Handle::try_current().map_err(|e| {
            WaypointError::Configuration(format!("client must be initialized inside a tokio runtime: {}", e))
        })?;

        let config = self.config;
        let cache = Arc::new(AddressCache::new(config.cache_expiry));
        let endpoint = Arc::new(RegistryEndpoint::new(fallback));
        let middleware = Arc::new(self.middleware);
        let location = Arc::new(RwLock::new(location.into()));
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::new(config.send_timeout)),
        };

        let resolver = Resolver::new(registry, Arc::clone(&endpoint), config.resolve.clone());
        let dispatcher = Dispatcher::new(
            Arc::clone(&cache),
            resolver,
            Arc::clone(&middleware),
            transport,
            Arc::clone(&location),
        );

        let maintenance = vec![
            EvictionSweeper::new(Arc::clone(&cache), config.eviction_interval).spawn(),
            FallbackReset::new(Arc::clone(&endpoint), config.fallback_reset_interval).spawn(),
        ];

        tracing::info!(
            fallback = %endpoint.fallback(),
            location = %location.read().as_str(),
            "Waypoint client initialized"
        );

        Ok(WaypointClient {
            inner: Arc::new(ClientInner {
                dispatcher,
                cache,
                endpoint,
                middleware,
                location,
                maintenance,
            }),
        })
    }

    /// [`init`](Self::init) with the HTTP registry client, bounded by the
    /// configured `registry_timeout`.
    pub fn init_http(self, location: impl Into<Location>) -> Result<WaypointClient> {
        let registry = Arc::new(HttpRegistry::new(self.config.registry_timeout));
        self.init(registry, location)
    }
}

/// Initialized client; cheap to clone and safe to share between tasks.
///
/// # Example
///
/// ```no_run
/// use waypoint_client::{ClientBuilder, ClientConfig};
/// use waypoint_common::HostPort;
///
/// # async fn run() -> waypoint_common::Result<()> {
/// let config = ClientConfig::default().with_fallback(HostPort::new("10.9.0.1", 50000));
/// let client = ClientBuilder::new(config).init_http("eu-west/cell-4")?;
///
/// let response = client.get("http://orders-service:8080/orders/7").await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WaypointClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    dispatcher: Dispatcher,
    cache: Arc<AddressCache>,
    endpoint: Arc<RegistryEndpoint>,
    middleware: Arc<MiddlewareRegistry>,
    location: Arc<RwLock<Location>>,
    maintenance: Vec<JoinHandle<()>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for handle in &self.maintenance {
            handle.abort();
        }
    }
}

impl WaypointClient {
    /// Resolves, rewrites and sends `request`.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.inner.dispatcher.dispatch(request).await
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.execute(build_request(Method::GET, url, None, Bytes::new())?)
            .await
    }

    pub async fn head(&self, url: &str) -> Result<HttpResponse> {
        self.execute(build_request(Method::HEAD, url, None, Bytes::new())?)
            .await
    }

    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<HttpResponse> {
        self.execute(build_request(Method::POST, url, Some(content_type), body.into())?)
            .await
    }

    /// Posts `form` as `application/x-www-form-urlencoded`.
    pub async fn post_form<I, K, V>(&self, url: &str, form: I) -> Result<HttpResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();

        self.post(url, "application/x-www-form-urlencoded", body).await
    }

    /// Replaces the location token sent with subsequent resolutions.
    pub fn set_location(&self, location: impl Into<Location>) {
        let location = location.into();
        tracing::debug!(location = %location, "Location updated");
        *self.inner.location.write() = location;
    }

    pub fn location(&self) -> Location {
        self.inner.location.read().clone()
    }

    /// See [`MiddlewareRegistry::register`].
    pub fn register_middleware<F>(&self, id: impl Into<String>, callback: F, phase: Phase) -> Result<()>
    where
        F: Fn(CorrelationId, RequestView) + Send + Sync + 'static,
    {
        self.inner.middleware.register(id, callback, phase)
    }

    pub fn middleware(&self) -> &MiddlewareRegistry {
        &self.inner.middleware
    }

    pub fn cache(&self) -> &AddressCache {
        &self.inner.cache
    }

    /// The registry endpoint lookups currently go to.
    pub fn registry_endpoint(&self) -> HostPort {
        self.inner.endpoint.active()
    }
}

fn build_request(
    method: Method,
    url: &str,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<HttpRequest> {
    let uri = Uri::try_from(url)?;
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(content_type) = content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }

    Ok(builder.body(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryStatus;
    use async_trait::async_trait;
    use waypoint_common::protocol::ResolveQuery;

    struct NeverFound;

    #[async_trait]
    impl Registry for NeverFound {
        async fn lookup(&self, _: &HostPort, _: &ResolveQuery) -> Result<RegistryStatus> {
            Ok(RegistryStatus::NotFound)
        }
    }

    fn config() -> ClientConfig {
        ClientConfig::default().with_fallback(HostPort::new("10.9.0.1", 50000))
    }

    #[test]
    fn test_build_request() {
        let request =
            build_request(Method::POST, "http://svc-1:9000/orders", Some("text/plain"), Bytes::from("hi"))
                .unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().to_string(), "http://svc-1:9000/orders");
        assert_eq!(request.headers().get(CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(request.body(), &Bytes::from("hi"));
    }

    #[test]
    fn test_build_request_rejects_bad_url() {
        let err = build_request(Method::GET, "http://svc 1/", None, Bytes::new()).unwrap_err();
        assert!(matches!(err, WaypointError::MalformedDestination(_)));
    }

    #[tokio::test]
    async fn test_init_and_accessors() {
        let builder = ClientBuilder::new(config());
        builder
            .register_middleware("audit", |_, _| {}, Phase::BeforeResolution)
            .unwrap();

        let client = builder.init(Arc::new(NeverFound), "cell-1").unwrap();
        assert_eq!(client.location(), Location::new("cell-1"));
        assert_eq!(client.registry_endpoint(), HostPort::new("10.9.0.1", 50000));
        assert_eq!(client.middleware().ids(Phase::BeforeResolution), vec!["audit"]);
        assert!(client.cache().is_empty());

        client.set_location("cell-2");
        assert_eq!(client.location(), Location::new("cell-2"));

        // Registration after init still rejects duplicates
        assert!(client
            .register_middleware("audit", |_, _| {}, Phase::BeforeResolution)
            .is_err());
    }

    #[test]
    fn test_init_outside_runtime_is_a_configuration_error() {
        let err = ClientBuilder::new(config())
            .init(Arc::new(NeverFound), "cell-1")
            .err()
            .unwrap();
        assert!(matches!(err, WaypointError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_malformed_destination() {
        let client = ClientBuilder::new(config())
            .init(Arc::new(NeverFound), "cell-1")
            .unwrap();

        let request = Request::get("/relative/only").body(Bytes::new()).unwrap();
        let err = client.execute(request).await.unwrap_err();
        assert!(matches!(err, WaypointError::MalformedDestination(_)));
    }

    #[tokio::test]
    async fn test_maintenance_stops_when_last_handle_drops() {
        let client = ClientBuilder::new(config())
            .init(Arc::new(NeverFound), "cell-1")
            .unwrap();

        let handles: Vec<_> = client
            .inner
            .maintenance
            .iter()
            .map(|h| h.abort_handle())
            .collect();

        let second = client.clone();
        drop(client);
        assert!(handles.iter().all(|h| !h.is_finished()));

        drop(second);
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !handles.iter().all(|h| h.is_finished()) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
