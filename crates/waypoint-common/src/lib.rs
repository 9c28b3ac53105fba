//! Waypoint Common Types
//!
//! This crate provides the shared vocabulary of the Waypoint service-resolving
//! HTTP client.
//!
//! # Overview
//!
//! Waypoint lets callers address logical service names (`orders-service:8080`)
//! and resolves them to concrete addresses through a service registry before
//! each request is sent. This crate contains the pieces shared by the client
//! and by registry implementations:
//!
//! - **Addresses**: [`HostPort`], [`Location`] and deployment-id derivation
//! - **Protocol Layer**: registry lookup messages, correlation ids, errors
//! - **Transport Layer**: the HTTP/JSON encoding of registry lookups
//!
//! # Components
//!
//! - [`address`] - `host:port` pairs and caller-location tokens
//! - [`protocol`] - Lookup query/reply types and the [`WaypointError`] taxonomy
//! - [`transport`] - Registry HTTP helpers
//!
//! # Example
//!
//! ```
//! use waypoint_common::{CorrelationId, HostPort, Location, ResolveQuery};
//!
//! let logical: HostPort = "orders-service-7:8080".parse().unwrap();
//! let query = ResolveQuery::new(&logical, Location::new("cell-1"), CorrelationId::generate());
//! assert_eq!(query.deployment_id, "orders");
//! ```

pub mod address;
pub mod protocol;
pub mod transport;

pub use address::{deployment_id, HostPort, Location};
pub use protocol::*;
