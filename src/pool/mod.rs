//! Bounded database connection pool.
//!
//! The pool owns every connection slot. Callers borrow a connection with
//! [`Pool::acquire`], use it exclusively, and hand it back by dropping the
//! [`PooledConn`] guard. Bookkeeping (idle list, counters) lives behind a
//! single mutex that is held only for bookkeeping, never across a database
//! round-trip. Capacity is enforced with a fair semaphore, so waiters are
//! served in arrival order.
//!
//! The pool is generic over a [`ConnectionManager`] that knows how to dial
//! and liveness-check one connection. Production code plugs in the
//! PostgreSQL manager from `crate::db`; tests plug in mocks.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// How often the shutdown drain re-checks for outstanding checkouts.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Errors surfaced by [`Pool::acquire`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PoolError {
    /// No connection became available (or could be created) within the
    /// caller's timeout. Retryable with backoff.
    #[error("no database connection available within {0:?}")]
    Exhausted(Duration),

    /// Shutdown has begun; no new connections are issued. Not retryable.
    #[error("connection pool is shut down")]
    Closed,
}

/// Dials and liveness-checks connections on behalf of the pool.
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Conn: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish one new authenticated connection.
    async fn connect(&self) -> Result<Self::Conn, Self::Error>;

    /// Lightweight liveness check for an idle connection.
    async fn is_alive(&self, conn: &mut Self::Conn) -> bool;
}

/// Pool sizing and timing bounds.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum simultaneously checked-out connections.
    pub max_size: usize,
    /// Idle time after which a connection is re-validated before handout.
    pub stale_after: Duration,
    /// How long `shutdown` waits for in-flight checkouts before force-closing.
    pub drain_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            stale_after: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// An idle connection slot with the metadata needed for staleness checks.
struct IdleConn<C> {
    id: u64,
    conn: C,
    idled_at: Instant,
}

struct PoolState<C> {
    /// Idle connections, reused LIFO for cache locality.
    idle: Vec<IdleConn<C>>,
    /// Live connections, idle plus checked out.
    total: usize,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    /// Fair semaphore bounding checkouts to `max_size`; waiters queue FIFO.
    semaphore: tokio::sync::Semaphore,
    state: Mutex<PoolState<M::Conn>>,
    checked_out: AtomicUsize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn lock_state(&self) -> MutexGuard<'_, PoolState<M::Conn>> {
        // Bookkeeping only; a poisoned lock still holds consistent counters.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Called from the guard's `Drop`. Must stay synchronous.
    ///
    /// The idle push happens under the state lock and strictly before the
    /// `checked_out` decrement, so shutdown's drain loop cannot observe a
    /// fully-drained pool while a release is still about to re-insert a
    /// connection. A release that sees `closed` destroys the connection.
    fn reclaim(&self, id: u64, conn: Option<M::Conn>, broken: bool) {
        let mut destroyed = None;
        let closed = {
            let mut state = self.lock_state();
            let closed = self.closed.load(Ordering::SeqCst);
            match conn {
                Some(conn) if !broken && !closed => {
                    state.idle.push(IdleConn {
                        id,
                        conn,
                        idled_at: Instant::now(),
                    });
                    tracing::debug!(id, idle = state.idle.len(), "connection returned to pool");
                }
                other => {
                    // Broken or post-shutdown: destroy instead of reuse. The
                    // slot is freed; the next acquire dials a replacement.
                    destroyed = other;
                    state.total = state.total.saturating_sub(1);
                    if broken {
                        tracing::debug!(id, "discarded broken connection");
                    }
                }
            }
            closed
        };
        drop(destroyed);
        self.checked_out.fetch_sub(1, Ordering::SeqCst);

        if !closed {
            self.semaphore.add_permits(1);
        }
    }
}

/// Bounded set of live database connections.
///
/// Cloning is cheap and shares the same underlying pool.
pub struct Pool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A point-in-time view of pool occupancy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub in_use: usize,
    pub idle: usize,
    pub total: usize,
}

impl<M: ConnectionManager> Pool<M> {
    /// Create an empty pool. Connections are dialed lazily on first acquire.
    pub fn new(config: PoolConfig, manager: M) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager,
                semaphore: tokio::sync::Semaphore::new(config.max_size),
                config,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    total: 0,
                }),
                checked_out: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Borrow a connection, waiting at most `timeout` for a free slot.
    ///
    /// Idle connections past the staleness threshold are liveness-checked
    /// first; dead ones are discarded and replaced without surfacing an
    /// error. If the replacement dial also fails the caller gets
    /// [`PoolError::Exhausted`].
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledConn<M>, PoolError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let permit = match tokio::time::timeout(timeout, inner.semaphore.acquire()).await {
            Ok(Ok(permit)) => permit,
            // Semaphore closed by shutdown while we were queued.
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                tracing::debug!(?timeout, "acquire timed out waiting for a free slot");
                return Err(PoolError::Exhausted(timeout));
            }
        };
        if inner.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        // We own a slot. Reuse an idle connection if a live one exists,
        // otherwise dial a fresh one.
        loop {
            let candidate = inner.lock_state().idle.pop();
            match candidate {
                Some(idle) => {
                    let mut conn = idle.conn;
                    if idle.idled_at.elapsed() >= inner.config.stale_after
                        && !inner.manager.is_alive(&mut conn).await
                    {
                        tracing::debug!(id = idle.id, "discarded stale connection");
                        drop(conn);
                        inner.lock_state().total -= 1;
                        continue;
                    }
                    permit.forget();
                    inner.checked_out.fetch_add(1, Ordering::SeqCst);
                    return Ok(PooledConn::checked_out(idle.id, conn, Arc::clone(inner)));
                }
                None => match inner.manager.connect().await {
                    Ok(conn) => {
                        let id = inner.next_id.fetch_add(1, Ordering::SeqCst);
                        inner.lock_state().total += 1;
                        permit.forget();
                        inner.checked_out.fetch_add(1, Ordering::SeqCst);
                        tracing::debug!(id, "opened new connection");
                        return Ok(PooledConn::checked_out(id, conn, Arc::clone(inner)));
                    }
                    Err(e) => {
                        // Slot is free but the database refused us; the
                        // dropped permit releases the slot for later retries.
                        tracing::warn!(error = %e, "failed to open database connection");
                        return Err(PoolError::Exhausted(timeout));
                    }
                },
            }
        }
    }

    /// Stop issuing connections, wait up to the drain timeout for in-flight
    /// checkouts to come back, then close everything that remains.
    ///
    /// Idempotent; queued acquirers are woken with [`PoolError::Closed`].
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.semaphore.close();
        tracing::info!("pool shutdown: draining checked-out connections");

        let deadline = Instant::now() + inner.config.drain_timeout;
        loop {
            let outstanding = inner.checked_out.load(Ordering::SeqCst);
            if outstanding == 0 {
                break;
            }
            if Instant::now() >= deadline {
                // Stragglers are destroyed when their guards drop; the
                // closed flag keeps them out of the idle set.
                tracing::warn!(outstanding, "drain timeout expired; abandoning stragglers");
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        let mut state = inner.lock_state();
        let closed_idle = state.idle.len();
        state.idle.clear();
        state.total = state.total.saturating_sub(closed_idle);
        tracing::info!(closed_idle, "pool shutdown complete");
    }

    /// Whether `shutdown` has begun.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock_state();
        PoolStats {
            in_use: self.inner.checked_out.load(Ordering::SeqCst),
            idle: state.idle.len(),
            total: state.total,
        }
    }
}

/// Exclusive checkout of one pooled connection.
///
/// Dropping the guard returns the connection to the idle set, or destroys it
/// if it was marked broken or the pool has shut down in the meantime.
pub struct PooledConn<M: ConnectionManager> {
    id: u64,
    conn: Option<M::Conn>,
    broken: bool,
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> PooledConn<M> {
    fn checked_out(id: u64, conn: M::Conn, inner: Arc<PoolInner<M>>) -> Self {
        Self {
            id,
            conn: Some(conn),
            broken: false,
            inner,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Flag the connection as unusable. It will be destroyed on release
    /// instead of re-entering the idle set.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Clear the broken flag after the connection is known clean again,
    /// e.g. once an open transaction has committed or rolled back.
    pub fn mark_clean(&mut self) {
        self.broken = false;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl<M: ConnectionManager> std::fmt::Debug for PooledConn<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("id", &self.id)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl<M: ConnectionManager> Deref for PooledConn<M> {
    type Target = M::Conn;

    fn deref(&self) -> &M::Conn {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<M: ConnectionManager> DerefMut for PooledConn<M> {
    fn deref_mut(&mut self) -> &mut M::Conn {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<M: ConnectionManager> Drop for PooledConn<M> {
    fn drop(&mut self) {
        self.inner.reclaim(self.id, self.conn.take(), self.broken);
    }
}
