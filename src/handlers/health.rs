use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "calbot is running",
    }))
}

/// Configuration summary for operators. Secrets are reported only as
/// configured/missing.
pub async fn debug_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let presence = |s: &str| if s.is_empty() { "missing" } else { "configured" };

    Json(json!({
        "status": "running",
        "llm_provider": config.llm_provider,
        "model": config.llm_model,
        "llm_api_key": presence(&config.llm_api_key),
        "cal_api_key": presence(&config.cal_api_key),
        "cal_username": config.cal_username,
        "time_zone": config.time_zone.name(),
        "max_operation_rounds": config.max_operation_rounds,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
