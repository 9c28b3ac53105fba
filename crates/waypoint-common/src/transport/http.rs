//! Registry HTTP Utilities
//!
//! This module provides the HTTP encoding of the registry lookup protocol.
//!
//! # Architecture
//!
//! A lookup is a JSON `POST` to `http://{endpoint}{scope path}`. The registry
//! answers with:
//! - `200` and a [`ResolveReply`] body when the address is known
//! - `404` when it is not (the caller uses the logical address as-is)
//! - `408`, `429`, `503` or `504` when it is overloaded or timed out
//! - `307`/`308` with a `Location` header naming another registry endpoint
//! - anything else as a failure
//!
//! # Example
//!
//! ```
//! use waypoint_common::transport::http::HttpTransport;
//! use waypoint_common::protocol::{CorrelationId, ResolveQuery};
//! use waypoint_common::{HostPort, Location};
//!
//! let query = ResolveQuery::new(
//!     &HostPort::new("orders-service", 8080),
//!     Location::new("cell-1"),
//!     CorrelationId::generate(),
//! );
//! let request = HttpTransport::build_resolve_request(&HostPort::new("127.0.0.1", 50000), &query).unwrap();
//! assert_eq!(request.uri().path(), "/services/resolve");
//! ```

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use hyper::{Method, Request, Response, StatusCode};

use crate::address::HostPort;
use crate::protocol::error::{Result, WaypointError};
use crate::protocol::{ResolveQuery, ResolveReply};

/// Type alias for Hyper incoming requests
pub type HyperRequest = Request<Incoming>;

/// Type alias for Hyper responses with full body
pub type HyperResponse = Response<Full<Bytes>>;

/// Registry HTTP helper functions
///
/// Provides conversion between HTTP messages and registry lookup messages,
/// for both the client side and registry implementations.
pub struct HttpTransport;

impl HttpTransport {
    /// Builds the HTTP request for one registry lookup.
    pub fn build_resolve_request(
        endpoint: &HostPort,
        query: &ResolveQuery,
    ) -> Result<Request<Full<Bytes>>> {
        let body = serde_json::to_vec(query)?;
        let uri = format!("http://{}{}", endpoint, query.scope.path());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))?;

        Ok(request)
    }

    /// Parse a lookup query from an HTTP body
    pub fn parse_resolve_query(body: Bytes) -> Result<ResolveQuery> {
        serde_json::from_slice(&body).map_err(WaypointError::JsonSerialization)
    }

    /// Parse a successful lookup reply from an HTTP body
    pub fn parse_resolve_reply(body: &[u8]) -> Result<ResolveReply> {
        serde_json::from_slice(body).map_err(|e| {
            WaypointError::InvalidResponse(format!("malformed registry reply: {}", e))
        })
    }

    /// Extracts the registry endpoint named by a redirect's `Location` header.
    ///
    /// Accepts either an absolute URL (`http://host:port/...`) or a bare
    /// `host:port`.
    pub fn redirect_target<B>(response: &Response<B>) -> Result<HostPort> {
        let location = response
            .headers()
            .get(LOCATION)
            .ok_or_else(|| WaypointError::InvalidResponse("redirect without Location header".into()))?
            .to_str()
            .map_err(|e| WaypointError::InvalidResponse(format!("unreadable Location header: {}", e)))?;

        let authority = location
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(location);
        let authority = authority.split('/').next().unwrap_or(authority);

        authority
            .parse::<HostPort>()
            .map_err(|e| WaypointError::InvalidResponse(format!("bad redirect target '{}': {}", location, e)))
    }

    /// Create an HTTP `200` response from a lookup reply
    pub fn to_http_response(reply: &ResolveReply) -> HyperResponse {
        let body = serde_json::to_vec(reply).unwrap_or_default();

        let mut response = Response::new(Full::new(Bytes::from(body)));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Create an empty HTTP response with the given status code
    pub fn to_http_status(status: StatusCode) -> HyperResponse {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    /// Create a `307` response pointing at another registry endpoint
    pub fn to_http_redirect(endpoint: &HostPort) -> Result<HyperResponse> {
        let location = HeaderValue::from_str(&format!("http://{}/", endpoint))
            .map_err(|e| WaypointError::MalformedDestination(e.to_string()))?;

        let mut response = Self::to_http_status(StatusCode::TEMPORARY_REDIRECT);
        response.headers_mut().insert(LOCATION, location);
        Ok(response)
    }
}
