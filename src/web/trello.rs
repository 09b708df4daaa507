//! 通用操作入口 POST|GET /api/trello：`{operation, params}` 直接分派到同名工具
//!
//! operation 缺失或未注册为 400，且不消耗限流配额。工具失败按错误类型映射状态码。

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{Extension, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::Value;

use crate::validation::{operation_from_query, validate_operation_request, OperationRequest};
use crate::web::error::ApiError;
use crate::web::request::RequestContext;
use crate::web::state::AppState;
use crate::web::{admit, json_body, ROUTE_TRELLO};

async fn dispatch(
    state: Arc<AppState>,
    ctx: RequestContext,
    body: Value,
) -> Result<Response, ApiError> {
    let executor = state.orchestrator.executor().clone();
    let OperationRequest { operation, params } =
        validate_operation_request(&body, &executor.tool_names()).map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_TRELLO)?;

    tracing::info!(request_id = %ctx.request_id, %operation, "Dispatching operation");
    let out = executor
        .execute(&operation, params)
        .await
        .map_err(|e| ApiError::new(e, &ctx))?;
    let mut resp = Json(out).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(&headers, body).map_err(|e| ApiError::new(e, &ctx))?;
    dispatch(state, ctx, body).await
}

/// 查询串版本，便于简单读操作
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let body = operation_from_query(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    dispatch(state, ctx, body).await
}
