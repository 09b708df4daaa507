//! POST /api/chat：校验 → 限流 → 后台编排 → SSE

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::chat::{sse_response, RunContext, RunPhase};
use crate::validation::validate_chat_request;
use crate::web::error::ApiError;
use crate::web::request::RequestContext;
use crate::web::state::AppState;
use crate::web::{admit, json_body, ROUTE_CHAT};

/// 事件通道容量；消费端慢时编排任务在 send 上等待
const EVENT_BUFFER: usize = 64;

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(&headers, body)
        .and_then(|value| validate_chat_request(&value))
        .map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_CHAT)?;
    if let Some(text) = request.last_user_text() {
        let preview: String = text.chars().take(80).collect();
        tracing::debug!(request_id = %ctx.request_id, prompt = %preview, "Chat request accepted");
    }

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let orchestrator = state.orchestrator.clone();
    let run_ctx = RunContext::new(ctx.request_id.clone());
    tokio::spawn(async move {
        let request_id = run_ctx.request_id.clone();
        let outcome = orchestrator.run(request, run_ctx, tx).await;
        if outcome.phase == RunPhase::Abandoned {
            tracing::info!(%request_id, steps = outcome.steps, "Client disconnected, generation abandoned");
        }
    });

    let mut resp = sse_response(rx, state.config.server.keep_alive_secs).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}
