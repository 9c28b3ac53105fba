//! Request observers.
//!
//! Observers are registered per [`Phase`] under a caller-chosen id and are
//! invoked for every dispatched request: before-resolution observers see the
//! request as the caller built it, after-resolution observers see it with
//! the destination rewritten. Each invocation runs as its own tokio task; the
//! dispatcher neither orders nor awaits them.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hyper::body::Bytes;
use hyper::{HeaderMap, Method, Uri, Version};
use std::sync::Arc;
use waypoint_common::protocol::error::{Result, WaypointError};
use waypoint_common::protocol::{CorrelationId, Phase};

use crate::transport::HttpRequest;

/// Observer callback.
pub type Middleware = Arc<dyn Fn(CorrelationId, RequestView) + Send + Sync>;

/// Read-only snapshot of a request handed to observers.
///
/// Cheap to clone; every observer of one phase shares the same snapshot.
#[derive(Debug, Clone)]
pub struct RequestView {
    inner: Arc<ViewInner>,
}

#[derive(Debug)]
struct ViewInner {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl RequestView {
    pub fn new(request: &HttpRequest) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                method: request.method().clone(),
                uri: request.uri().clone(),
                version: request.version(),
                headers: request.headers().clone(),
                body: request.body().clone(),
            }),
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn version(&self) -> Version {
        self.inner.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.inner.body
    }
}

/// Observers keyed by id, one table per phase.
#[derive(Default)]
pub struct MiddlewareRegistry {
    before: DashMap<String, Middleware>,
    after: DashMap<String, Middleware>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, phase: Phase) -> &DashMap<String, Middleware> {
        match phase {
            Phase::BeforeResolution => &self.before,
            Phase::AfterResolution => &self.after,
        }
    }

    /// Registers `callback` under `id` for `phase`.
    ///
    /// An id already taken in that phase is rejected and the existing
    /// observer stays in place. The same id may be used in both phases.
    pub fn register<F>(&self, id: impl Into<String>, callback: F, phase: Phase) -> Result<()>
    where
        F: Fn(CorrelationId, RequestView) + Send + Sync + 'static,
    {
        let id = id.into();

        match self.table(phase).entry(id) {
            Entry::Occupied(entry) => Err(WaypointError::DuplicateMiddleware {
                id: entry.key().clone(),
                phase,
            }),
            Entry::Vacant(entry) => {
                tracing::debug!(id = %entry.key(), phase = %phase, "Registered middleware");
                entry.insert(Arc::new(callback));
                Ok(())
            }
        }
    }

    /// Spawns every `phase` observer with `view` and returns immediately.
    pub fn fire(&self, phase: Phase, correlation_id: CorrelationId, view: RequestView) {
        // Snapshot first so no shard lock is held while spawning
        let observers: Vec<Middleware> = self
            .table(phase)
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for observer in observers {
            let view = view.clone();
            tokio::spawn(async move {
                observer(correlation_id, view);
            });
        }
    }

    /// Registered ids for `phase`, sorted.
    pub fn ids(&self, phase: Phase) -> Vec<String> {
        let mut ids: Vec<String> = self
            .table(phase)
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self, phase: Phase) -> usize {
        self.table(phase).len()
    }

    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}
