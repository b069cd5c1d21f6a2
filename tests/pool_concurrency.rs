//! End-to-end concurrency properties of the connection pool, driven through
//! the public API with a mock backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pg_gateway::pool::{ConnectionManager, Pool, PoolConfig, PoolError};

struct TestConn;

struct TestManager {
    connects: AtomicUsize,
}

#[derive(Debug, thiserror::Error)]
#[error("dial failed")]
struct DialError;

#[async_trait]
impl ConnectionManager for TestManager {
    type Conn = TestConn;
    type Error = DialError;

    async fn connect(&self) -> Result<TestConn, DialError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(TestConn)
    }

    async fn is_alive(&self, _conn: &mut TestConn) -> bool {
        true
    }
}

fn make_pool(max_size: usize, drain_timeout: Duration) -> Pool<TestManager> {
    Pool::new(
        PoolConfig {
            max_size,
            stale_after: Duration::from_secs(300),
            drain_timeout,
        },
        TestManager {
            connects: AtomicUsize::new(0),
        },
    )
}

#[tokio::test]
async fn checkout_bound_holds_under_heavy_contention() {
    const MAX: usize = 5;
    const TASKS: usize = 100;

    let pool = make_pool(MAX, Duration::from_secs(1));
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..TASKS {
        let pool = pool.clone();
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            let conn = pool.acquire(Duration::from_secs(10)).await.unwrap();
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            drop(conn);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(
        peak.load(Ordering::SeqCst) <= MAX,
        "more than max_size connections were checked out simultaneously"
    );
    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert!(stats.total <= MAX);
}

#[tokio::test]
async fn extra_request_waits_then_fails_or_succeeds_without_deadlock() {
    const N: usize = 3;
    let pool = make_pool(N, Duration::from_secs(1));

    // N long-running checkouts.
    let mut held = Vec::new();
    for _ in 0..N {
        held.push(pool.acquire(Duration::from_millis(500)).await.unwrap());
    }

    // The N+1th request fails within its budget while the others are held.
    let timeout = Duration::from_millis(80);
    let started = Instant::now();
    let err = pool.acquire(timeout).await.unwrap_err();
    assert_eq!(err, PoolError::Exhausted(timeout));
    assert!(started.elapsed() < Duration::from_secs(2), "no deadlock");

    // Once one holder releases, the same request succeeds.
    held.pop();
    let conn = pool.acquire(Duration::from_millis(500)).await.unwrap();
    drop(conn);
    drop(held);
}

#[tokio::test]
async fn shutdown_under_load_never_hangs() {
    const MAX: usize = 4;
    let pool = make_pool(MAX, Duration::from_millis(200));

    // Churn acquires while shutdown runs.
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                match pool.acquire(Duration::from_millis(100)).await {
                    Ok(conn) => {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        drop(conn);
                    }
                    Err(PoolError::Closed) => break,
                    Err(PoolError::Exhausted(_)) => continue,
                }
            }
        }));
    }

    tokio::time::sleep(Duration::from_millis(30)).await;
    let started = Instant::now();
    pool.shutdown().await;
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "shutdown must respect its drain timeout"
    );

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(pool.acquire(Duration::from_secs(1)).await.unwrap_err(), PoolError::Closed);
}
