//! http_server - HTTP gateway over a pooled PostgreSQL backend.
//!
//! Startup order:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │  Config  │───▶│   Pool   │───▶│  Ready   │───▶│  Serve   │
//! │  (YAML)  │    │ (retry)  │    │  (flag)  │    │ (drain)  │
//! └──────────┘    └──────────┘    └──────────┘    └──────────┘
//! ```
//!
//! The database is validated with a bounded retry budget before the listener
//! is bound; an unreachable database means a non-zero exit without ever
//! accepting traffic.

use std::sync::Arc;

use anyhow::Context;

use pg_gateway::config::AppConfig;
use pg_gateway::db::Database;
use pg_gateway::gateway::{self, state::AppState};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

#[tokio::main]
async fn main() {
    let env = get_env();
    let app_config = AppConfig::load(&env);
    let _log_guard = pg_gateway::logging::init_logging(&app_config);

    tracing::info!(env = %env, git = env!("GIT_HASH"), "starting http_server");

    if let Err(e) = run(app_config).await {
        tracing::error!(error = format!("{e:#}"), "fatal startup/runtime error");
        std::process::exit(1);
    }
    tracing::info!("shutdown complete");
}

async fn run(app_config: AppConfig) -> anyhow::Result<()> {
    let db = Arc::new(Database::new(&app_config.database.to_database_config()));

    db.wait_until_ready(
        app_config.database.startup_attempts,
        app_config.database.startup_retry_delay(),
    )
    .await
    .context("database unreachable; refusing to start")?;

    let state = Arc::new(AppState::new(db.clone(), &app_config.gateway));
    state.mark_ready();

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    let addr = format!("{}:{}", app_config.gateway.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, pool_size = app_config.database.max_size, "gateway listening");

    gateway::run_server(listener, state, app_config.gateway.drain_window())
        .await
        .context("server error")?;

    // Listener is closed and in-flight requests are done (or abandoned);
    // now wind down the pool within its own drain budget.
    db.shutdown().await;
    Ok(())
}
