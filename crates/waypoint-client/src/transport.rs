//! Request transport.
//!
//! The dispatcher hands fully rewritten requests to a [`Transport`]. The
//! production implementation, [`HyperTransport`], wraps hyper-util's pooled
//! client and classifies failures into the [`SendErrorKind`]s the dispatcher
//! needs to decide whether a fresh resolution is worth trying.

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::io;
use std::time::Duration;
use waypoint_common::protocol::{SendError, SendErrorKind};

/// Outgoing request with a fully buffered body.
///
/// The body is `Bytes` so the dispatcher can resend it after a failed
/// attempt without the caller's involvement.
pub type HttpRequest = Request<Bytes>;

/// Response with its body collected.
pub type HttpResponse = Response<Bytes>;

/// Pooled hyper client shared by the transport and the HTTP registry.
pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// Builds the pooled client used for both registry lookups and requests.
pub fn build_http_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);
    connector.set_connect_timeout(Some(connect_timeout));

    Client::builder(TokioExecutor::new()).build(connector)
}

/// Something that can deliver a request and return its response.
///
/// Implementations must return `Ok` for any response obtained, whatever its
/// status code; `Err` is reserved for failing to obtain one.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SendError>;
}

/// [`Transport`] backed by hyper-util's legacy pooled client.
#[derive(Clone)]
pub struct HyperTransport {
    client: HttpClient,
    timeout: Duration,
}

impl HyperTransport {
    /// Creates a transport that gives every request `timeout` to complete,
    /// including reading the response body.
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(build_http_client(timeout), timeout)
    }

    pub fn with_client(client: HttpClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, SendError> {
        let address = request
            .uri()
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default();

        let exchange = async {
            let response = self
                .client
                .request(request.map(Full::new))
                .await
                .map_err(|e| SendError::new(classify(&e), address.clone(), describe(&e)))?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| {
                    SendError::new(SendErrorKind::Other, address.clone(), format!("failed to read body: {}", e))
                })?
                .to_bytes();

            Ok::<_, SendError>(Response::from_parts(parts, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SendError::timeout(address.clone()))?
    }
}

/// Maps a hyper-util client error onto a [`SendErrorKind`].
///
/// The io error buried in the source chain decides. Errors without an io
/// cause (URL or scheme rejected by the connector) are not network
/// conditions and map to `Other`.
pub fn classify(err: &hyper_util::client::legacy::Error) -> SendErrorKind {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);

    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return classify_io(io_err.kind());
        }
        source = e.source();
    }

    SendErrorKind::Other
}

/// Renders `err` followed by its innermost cause.
///
/// hyper-util's own message is only `client error (Connect)`.
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut innermost = None;
    let mut source = err.source();
    while let Some(cause) = source {
        innermost = Some(cause);
        source = cause.source();
    }

    match innermost {
        Some(cause) => format!("{}: {}", err, cause),
        None => err.to_string(),
    }
}

fn classify_io(kind: io::ErrorKind) -> SendErrorKind {
    match kind {
        io::ErrorKind::TimedOut => SendErrorKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => SendErrorKind::Unreachable,
        _ => SendErrorKind::Other,
    }
}
