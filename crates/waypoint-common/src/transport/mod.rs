//! Waypoint Registry Transport
//!
//! This module holds the HTTP encoding of registry lookups. It is shared by
//! the client-side registry implementation and by registry servers (and the
//! test registries in this workspace).
//!
//! # Components
//!
//! - **[`HttpTransport`]**: Conversion between HTTP messages and lookup messages
//! - **[`HyperRequest`]** / **[`HyperResponse`]**: Hyper type aliases for registry servers

pub mod http;

pub use self::http::{HttpTransport, HyperRequest, HyperResponse};
