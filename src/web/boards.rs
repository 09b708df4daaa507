//! 看板 CRUD 路由
//!
//! 非法 id（非 24 位十六进制）一律 400；格式正确但不存在为 404。校验全部先于限流。

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;

use crate::core::AppError;
use crate::resources::{validate_id, BoardCreate, BoardFilter, BoardUpdate, ResourceKind};
use crate::validation::parse_body;
use crate::web::error::ApiError;
use crate::web::request::RequestContext;
use crate::web::state::AppState;
use crate::web::{admit, json_body, ROUTE_BOARD, ROUTE_BOARDS};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: Option<String>,
}

pub async fn list_boards(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    query: Option<Query<ListQuery>>,
) -> Result<Response, ApiError> {
    let raw = query.and_then(|Query(q)| q.filter);
    let (filter, fell_back) = BoardFilter::parse_lenient(raw.as_deref());
    if fell_back {
        tracing::warn!(request_id = %ctx.request_id, filter = ?raw, "Unknown board filter, using 'all'");
    }
    let admitted = admit(&state, &ctx, ROUTE_BOARDS)?;

    let boards = state
        .gateway
        .list_boards(filter)
        .await
        .map_err(|e| ApiError::new(e, &ctx))?;
    let mut resp = Json(json!({
        "success": true,
        "count": boards.len(),
        "filter": filter.as_str(),
        "boards": boards,
    }))
    .into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}

pub async fn create_board(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(&headers, body)
        .and_then(parse_body::<BoardCreate>)
        .and_then(|input| input.validate().map(|_| input))
        .map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_BOARDS)?;

    let board = state
        .gateway
        .create_board(input)
        .await
        .map_err(|e| ApiError::new(e, &ctx))?;
    tracing::info!(request_id = %ctx.request_id, board_id = %board.id, "Board created");
    let mut resp = (StatusCode::CREATED, Json(board)).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}

pub async fn get_board(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(board_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_id(ResourceKind::Board, &board_id).map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_BOARD)?;

    let board = state
        .gateway
        .get_board(&board_id)
        .await
        .map_err(|e| ApiError::new(e, &ctx))?;
    let mut resp = Json(board).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}

pub async fn update_board(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(board_id): Path<String>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let input = validate_id(ResourceKind::Board, &board_id)
        .and_then(|_| json_body(&headers, body))
        .and_then(parse_body::<BoardUpdate>)
        .map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_BOARD)?;

    let board = state
        .gateway
        .update_board(&board_id, input)
        .await
        .map_err(|e| ApiError::new(e, &ctx))?;
    tracing::info!(request_id = %ctx.request_id, board_id = %board.id, "Board updated");
    let mut resp = Json(board).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}

pub async fn delete_board(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Path(board_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_id(ResourceKind::Board, &board_id).map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_BOARD)?;

    match state.gateway.delete_board(&board_id).await {
        Ok(()) => {
            tracing::info!(request_id = %ctx.request_id, %board_id, "Board deleted");
            let mut resp = Json(json!({
                "success": true,
                "id": board_id,
                "message": format!("Board {board_id} deleted"),
            }))
            .into_response();
            admitted.apply(resp.headers_mut());
            Ok(resp)
        }
        Err(AppError::NotFound(_)) => Err(ApiError::new(
            AppError::not_found(format!("Board {board_id} not found")),
            &ctx,
        )),
        Err(e) => Err(ApiError::new(e, &ctx)),
    }
}
