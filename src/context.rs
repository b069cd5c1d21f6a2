//! Per-request state and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use uuid::Uuid;

/// Cooperative cancellation flag, passed through a request's call chain and
/// checked at the database round-trip boundary.
///
/// In the serving path itself a client disconnect cancels a request by
/// dropping its handler future; the transaction guard then destroys the
/// connection instead of pooling it. The token is the explicit seam for
/// callers that drive the access layer outside that path (background jobs,
/// tests) and want to abort without dropping the future.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called. Never resolves otherwise.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// State carried by one in-flight request: identity for log correlation, the
/// connection-acquire budget, and the cancellation signal.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub request_id: Uuid,
    /// Per-request bound on waiting for a pooled connection; distinct from
    /// the pool's internal timeouts.
    pub acquire_timeout: Duration,
    pub cancel: CancelToken,
}

impl RequestContext {
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            acquire_timeout,
            cancel: CancelToken::new(),
        }
    }
}
