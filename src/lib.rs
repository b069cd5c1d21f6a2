//! pg_gateway - HTTP service over a pooled PostgreSQL backend.
//!
//! # Modules
//!
//! - [`pool`] - Bounded connection pool (acquire/release/shutdown)
//! - [`db`] - Access layer: transactions, error translation, repositories
//! - [`gateway`] - Router, handlers, request lifecycle
//! - [`context`] - Per-request state and cancellation
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - tracing setup (file + stdout)
//! - [`error`] - Service-level error taxonomy

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod pool;

// Convenient re-exports at crate root
pub use context::{CancelToken, RequestContext};
pub use db::{Database, DatabaseConfig};
pub use error::ServiceError;
pub use pool::{ConnectionManager, Pool, PoolConfig, PoolError, PoolStats, PooledConn};
