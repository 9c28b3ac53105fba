//! Address Types
//!
//! Logical and resolved destinations are both plain `host:port` pairs; the
//! difference is only whether the registry has seen them yet.

use hyper::Uri;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::error::WaypointError;

/// A `host:port` pair.
///
/// IPv6 hosts are stored without brackets and rendered with them.
///
/// # Example
///
/// ```
/// use waypoint_common::HostPort;
///
/// let addr: HostPort = "orders-service:8080".parse().unwrap();
/// assert_eq!(addr.host, "orders-service");
/// assert_eq!(addr.port, 8080);
/// assert_eq!(addr.deployment_id(), "orders");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Extracts the destination of a request URI.
    ///
    /// A missing port falls back to the scheme default (80 for `http`, 443
    /// for `https`); any other scheme must carry an explicit port.
    pub fn from_uri(uri: &Uri) -> Result<Self, WaypointError> {
        let host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| WaypointError::MalformedDestination(format!("no host in '{}'", uri)))?;

        let port = match uri.port_u16() {
            Some(port) => port,
            None => match uri.scheme_str() {
                Some("http") => 80,
                Some("https") => 443,
                _ => {
                    return Err(WaypointError::MalformedDestination(format!(
                        "no port in '{}'",
                        uri
                    )))
                }
            },
        };

        Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), port))
    }

    /// Deployment id used by the registry to group instances of one service.
    ///
    /// It is the host prefix before the first `-`, or the whole host when
    /// there is no separator.
    pub fn deployment_id(&self) -> &str {
        deployment_id(&self.host)
    }
}

/// See [`HostPort::deployment_id`].
pub fn deployment_id(host: &str) -> &str {
    match host.split_once('-') {
        Some((prefix, _)) => prefix,
        None => host,
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for HostPort {
    type Err = WaypointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| WaypointError::MalformedDestination(format!("missing port in '{}'", s)))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(WaypointError::MalformedDestination(format!("missing host in '{}'", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| WaypointError::MalformedDestination(format!("bad port in '{}': {}", s, e)))?;

        Ok(Self::new(host, port))
    }
}

/// Opaque caller-location token forwarded with every resolution.
///
/// The registry uses it to pick the nearest instance; the client never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for Location {
    fn from(token: String) -> Self {
        Self(token)
    }
}
