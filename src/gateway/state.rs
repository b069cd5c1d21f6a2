use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::db::Database;

/// Gateway application state (shared).
pub struct AppState {
    /// Pooled PostgreSQL backend.
    pub db: Arc<Database>,
    /// False until the pool has validated at least one connection.
    ready: AtomicBool,
    /// Per-request budget for waiting on a pooled connection.
    request_acquire_timeout: Duration,
}

impl AppState {
    pub fn new(db: Arc<Database>, gateway: &GatewayConfig) -> Self {
        Self {
            db,
            ready: AtomicBool::new(false),
            request_acquire_timeout: gateway.request_acquire_timeout(),
        }
    }

    /// Build the per-request context handed through the handler call chain.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new(self.request_acquire_timeout)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
