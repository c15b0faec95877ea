use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::health::MonitorStatus;
use crate::observability::recorder::MetricsSnapshot;

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<MonitorStatus> {
    Json(state.monitor.status())
}

pub async fn get_metrics(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.monitor.recorder().snapshot())
}

pub async fn force_check(State(state): State<AdminState>) -> (StatusCode, Json<CheckResponse>) {
    if state.monitor.trigger_check() {
        tracing::info!("Health check forced via admin API");
        (
            StatusCode::ACCEPTED,
            Json(CheckResponse {
                accepted: true,
                reason: None,
            }),
        )
    } else {
        (
            StatusCode::CONFLICT,
            Json(CheckResponse {
                accepted: false,
                reason: Some("a health check is already in flight"),
            }),
        )
    }
}

pub async fn reset_failures(State(state): State<AdminState>) -> Json<MonitorStatus> {
    state.monitor.reset_failures();
    Json(state.monitor.status())
}
