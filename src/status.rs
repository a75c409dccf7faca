//! Minimal liveness endpoint.
//!
//! Serves a static message on `/` and `ok` on `/health`. It shares nothing
//! with the monitor loop except the immutable configuration it was built from.

use crate::config::StatusConfig;
use axum::{extract::State, routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct StatusState {
    message: String,
}

/// Build the status router serving `message` on `/`.
pub fn router(message: impl Into<String>) -> Router {
    let state = Arc::new(StatusState {
        message: message.into(),
    });

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .with_state(state)
}

async fn index(State(state): State<Arc<StatusState>>) -> String {
    format!("{}\n", state.message)
}

async fn health() -> &'static str {
    "ok"
}

/// Bind `config.bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve(config: &StatusConfig, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("Status endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config.message.clone()))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    log::info!("Status endpoint stopped");
    Ok(())
}
