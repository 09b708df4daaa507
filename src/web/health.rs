//! 健康检查与运行统计

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::web::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": state.orchestrator.model(),
        "backend": state.gateway.backend_name(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let (prompt_tokens, completion_tokens) = state.orchestrator.token_usage();
    Json(json!({
        "requests": state.monitor.snapshot(),
        "rateLimit": state.limiter.stats(),
        "cache": state.gateway.cache_stats(),
        "tokens": {
            "promptTokens": prompt_tokens,
            "completionTokens": completion_tokens,
        },
    }))
}
