//! Waypoint client.
//!
//! Wraps an HTTP client so that requests addressed to logical service names
//! (`orders-service:8080`) are sent to the concrete address a service
//! registry resolves them to. Resolutions are cached for a bounded time,
//! registry timeouts are retried with linear backoff, and a failed send to a
//! cached address is retried once against a fresh resolution.

pub mod cache;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod maintenance;
pub mod middleware;
pub mod registry;
pub mod resolver;
pub mod transport;

pub use cache::{AddressCache, CachedAddress};
pub use client::{ClientBuilder, WaypointClient};
pub use config::{ClientConfig, ResolveRetryConfig, FALLBACK_ENV};
pub use middleware::{Middleware, MiddlewareRegistry, RequestView};
pub use registry::{HttpRegistry, Registry, RegistryEndpoint, RegistryStatus};
pub use resolver::{Resolution, Resolver};
pub use transport::{HttpRequest, HttpResponse, HyperTransport, Transport};
