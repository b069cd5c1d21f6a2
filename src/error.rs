//! Service-level error taxonomy.
//!
//! Every failure a request can hit maps to exactly one of these variants;
//! handlers and callers never branch on driver-specific detail. The HTTP
//! status mapping lives with the gateway response types.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// No pooled connection became available within the request's budget.
    /// Retryable by the caller with backoff.
    #[error("no database connection available within {0:?}")]
    PoolExhausted(Duration),

    /// Shutdown is in progress; not retryable against this instance.
    #[error("service is shutting down")]
    PoolClosed,

    /// A connection died and could not be replaced.
    #[error("database connection failed: {0}")]
    ConnectionBroken(String),

    /// The handler or the database failed mid-transaction; all changes were
    /// rolled back.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The database was unreachable beyond the startup retry budget. Fatal;
    /// the process exits non-zero.
    #[error("startup failed: {0}")]
    Startup(String),
}

impl ServiceError {
    /// Stable machine-readable code reported in error responses.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::PoolExhausted(_) => "SERVICE_UNAVAILABLE",
            ServiceError::PoolClosed => "SHUTTING_DOWN",
            ServiceError::ConnectionBroken(_) => "DATABASE_UNAVAILABLE",
            ServiceError::TransactionFailed(_) => "TRANSACTION_FAILED",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::BadRequest(_) => "INVALID_PARAMETER",
            ServiceError::Startup(_) => "STARTUP_FAILURE",
        }
    }
}
