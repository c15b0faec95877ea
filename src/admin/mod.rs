//! Operator control surface for the supervisor.
//!
//! # Routes
//! - `GET  /admin/status`  : status dump
//! - `GET  /admin/metrics` : current metrics snapshot
//! - `POST /admin/check`   : force an immediate probe
//! - `POST /admin/reset`   : reset the failure count
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::health::HealthMonitor;
use crate::lifecycle::ShutdownSignal;

const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AdminState {
    pub monitor: Arc<HealthMonitor>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(monitor: Arc<HealthMonitor>, api_key: &str) -> Self {
        Self {
            monitor,
            api_key: Arc::from(api_key),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/metrics", get(get_metrics))
        .route("/admin/check", post(force_check))
        .route("/admin/reset", post(reset_failures))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(ADMIN_REQUEST_TIMEOUT)),
        )
}

/// Serve the admin router until shutdown.
pub async fn serve(listener: TcpListener, state: AdminState, mut shutdown: ShutdownSignal) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
