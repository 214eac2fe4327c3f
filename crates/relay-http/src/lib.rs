//! HTTP front door for the relay.
//!
//! # Endpoints
//!
//! - `GET /` - service banner and readiness
//! - `GET /health` - readiness plus relay and monitor counts
//! - `POST /relay` - relay one message (legacy alias: `POST /message`)
//! - `POST /reload-config` - re-read the config file, restart the monitor
//! - `GET /earthmc/status` - monitor state
//! - `POST /earthmc/force-check` - poll the entity API now

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use relay_core::context::AppContext;
use tracing::info;

pub mod auth;
pub mod error;
pub mod handlers;

#[cfg(test)]
mod test_support;

pub use error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppContext>,
}

impl AppState {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { inner: ctx }
    }

    pub fn context(&self) -> &AppContext {
        &self.inner
    }
}

pub fn build_router(state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", get(handlers::index_handler))
        .route("/health", get(handlers::health_handler))
        .route("/relay", post(handlers::relay_handler))
        .route("/message", post(handlers::relay_handler))
        .route("/reload-config", post(handlers::reload_config_handler))
        .route("/earthmc/status", get(handlers::monitor_status_handler))
        .route("/earthmc/force-check", post(handlers::force_check_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(state: AppState, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding http listener on {addr}"))?;
    info!(%addr, "http server listening");
    info!("relay endpoint available at http://{addr}/relay");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server")?;
    Ok(())
}
