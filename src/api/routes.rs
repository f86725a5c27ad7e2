use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::config::DEFAULT_LOOKAHEAD_HOURS;
use crate::db::models::AlarmLogEntry;
use crate::engine::AlertEngine;
use crate::error::AppError;
use crate::types::CycleSummary;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AlertEngine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/alerts/run", post(run_cycle))
        .route("/alerts/logs", get(recent_logs))
        .with_state(state)
}

#[derive(Deserialize)]
pub struct RunQuery {
    /// Lookahead horizon override for operator-triggered re-runs.
    pub hours: Option<i64>,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// On-demand evaluation cycle. Returns 409 while a scheduled cycle is
/// still running.
async fn run_cycle(
    State(state): State<ApiState>,
    Query(params): Query<RunQuery>,
) -> Result<Json<CycleSummary>, AppError> {
    let hours = params.hours.unwrap_or(DEFAULT_LOOKAHEAD_HOURS);
    let summary = state.engine.run_cycle(hours).await?;
    Ok(Json(summary))
}

async fn recent_logs(
    State(state): State<ApiState>,
    Query(params): Query<LogsQuery>,
) -> Result<Json<Vec<AlarmLogEntry>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let logs = state.engine.recent_logs(limit).await?;
    Ok(Json(logs))
}
