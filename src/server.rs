//! Dispatch endpoint.
//!
//! The gateway posts each hook object as JSON to `/dispatch` and applies the
//! object that comes back.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::phantom::{Dispatcher, HookObject};

/// Build the dispatch router.
pub fn router(dispatcher: Arc<dyn Dispatcher>) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch))
        .route("/health", get(health))
        .with_state(dispatcher)
}

async fn dispatch(
    State(dispatcher): State<Arc<dyn Dispatcher>>,
    Json(object): Json<HookObject>,
) -> Json<HookObject> {
    debug!(hook = %object.hook_name, "Dispatching hook");
    Json(dispatcher.dispatch(object).await)
}

async fn health() -> &'static str {
    "ok"
}

/// Serve until Ctrl-C. Failing to bind is fatal.
pub async fn serve(port: u16, dispatcher: Arc<dyn Dispatcher>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, "Phantom token agent listening");
    axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Dispatch server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
