//! HTTP gateway: router, per-request tracing, and the serving loop.
//!
//! Per-request lifecycle: route match, then the handler borrows a pooled
//! connection through the access layer, executes inside a transaction, and
//! the response is serialized back. Unmatched routes short-circuit to 404
//! without touching the database.

pub mod handlers;
pub mod state;
pub mod types;

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use state::AppState;

/// Tag every request with an id and a tracing span, and log the outcome.
async fn trace_requests(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let span = tracing::info_span!("request", %request_id, %method, path = %path);
    let response = next.run(request).instrument(span).await;

    tracing::debug!(
        %request_id,
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "request completed"
    );
    response
}

/// Build the complete router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .route("/records", post(handlers::create_record))
        .route("/records/{record_id}", get(handlers::get_record))
        .route(
            "/records/{record_id}",
            axum::routing::delete(handlers::delete_record),
        );

    Router::new()
        .nest("/api/v1", api)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(trace_requests))
        .with_state(state)
}

/// Serve until a termination signal arrives, then drain in-flight requests
/// within `drain_window`. Requests still running when the window closes are
/// aborted; the pool's own shutdown handles their connections.
pub async fn run_server(
    listener: TcpListener,
    state: Arc<AppState>,
    drain_window: Duration,
) -> std::io::Result<()> {
    let app = build_router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("termination signal received; draining in-flight requests");
        let _ = shutdown_tx.send(true);
    });

    let graceful = {
        let mut rx = shutdown_rx.clone();
        async move {
            let _ = rx.changed().await;
        }
    };
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(serve);

    let mut rx = shutdown_rx;
    let drain_deadline = async move {
        let _ = rx.changed().await;
        tokio::time::sleep(drain_window).await;
    };

    tokio::select! {
        result = &mut serve => result,
        _ = drain_deadline => {
            tracing::warn!(?drain_window, "drain window expired; aborting remaining requests");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
