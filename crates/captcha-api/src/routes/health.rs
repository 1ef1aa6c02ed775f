//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::db;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    database: bool,
    /// `enabled` or `disabled`
    task_runner: &'static str,
}

/// Readiness check (are all dependencies healthy?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    if !db::ping(&state.context.db).await {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    // Redis is not probed: the broker connects lazily and the web role
    // only ever enqueues.
    let task_runner = if state.tasks.is_enabled() {
        "enabled"
    } else {
        "disabled"
    };

    Ok(Json(ReadyResponse {
        status: "ready",
        database: true,
        task_runner,
    }))
}
