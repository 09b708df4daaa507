//! HTTP 层（axum）
//!
//! 路由：
//! - `POST /api/chat`：流式对话（SSE）
//! - `GET|POST /api/trello/boards`、`GET|PUT|DELETE /api/trello/boards/:board_id`：看板 CRUD
//! - `POST|GET /api/trello`：按 operation 分派到任意已注册工具
//! - `GET /api/{boards,lists,cards,labels,checklists,attachments,workspaces}`：只读列表
//! - `POST /api/ui/generate-form`：表单描述
//! - `GET /api/health`、`GET /api/metrics`
//!
//! 每个业务路由的顺序固定为：校验 → 限流 → 执行，校验失败不消耗限流配额。

pub mod boards;
pub mod chat;
pub mod error;
pub mod forms;
pub mod health;
pub mod request;
pub mod resources;
pub mod state;
pub mod trello;

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::HeaderMap;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde_json::Value;

use crate::core::AppError;
use crate::rate_limit::Admission;
use crate::validation;

pub use error::{ApiError, ErrorEnvelope};
pub use request::RequestContext;
pub use state::AppState;

pub const ROUTE_CHAT: &str = "/api/chat";
pub const ROUTE_BOARDS: &str = "/api/trello/boards";
pub const ROUTE_BOARD: &str = "/api/trello/boards/{boardId}";
pub const ROUTE_FORMS: &str = "/api/ui/generate-form";
pub const ROUTE_TRELLO: &str = "/api/trello";

/// 准入通过后的限流信息，写入成功响应的 X-RateLimit-* 头
#[derive(Debug, Clone, Copy)]
pub struct Admitted {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

impl Admitted {
    pub fn apply(&self, headers: &mut HeaderMap) {
        error::rate_limit_headers(headers, self.limit, self.remaining, self.reset_after_secs);
    }
}

/// 读出请求体并解析为 JSON 对象；超过体积上限等读取失败按 400 处理
pub(crate) fn json_body(headers: &HeaderMap, body: Result<Bytes, BytesRejection>) -> Result<Value, AppError> {
    let bytes = body.map_err(|rej| AppError::invalid(format!("Failed to read request body: {}", rej.body_text())))?;
    validation::parse_json_body(headers, &bytes)
}

/// 限流准入；拒绝时直接得到 429 错误
pub fn admit(state: &AppState, ctx: &RequestContext, route: &str) -> Result<Admitted, ApiError> {
    match state.limiter.admit(&ctx.client_ip, route) {
        Admission::Allowed {
            limit,
            remaining,
            reset_after_secs,
        } => Ok(Admitted {
            limit,
            remaining,
            reset_after_secs,
        }),
        Admission::Rejected {
            limit,
            retry_after_secs,
        } => {
            tracing::warn!(client = %ctx.client_ip, route, retry_after_secs, "Rate limit exceeded");
            Err(ApiError::new(AppError::RateLimited { retry_after_secs }, ctx).with_limit(limit))
        }
    }
}

async fn not_found(ctx: Option<Extension<RequestContext>>, headers: HeaderMap) -> ApiError {
    let ctx = match ctx {
        Some(Extension(ctx)) => ctx,
        None => RequestContext::new(&headers),
    };
    ApiError::new(AppError::not_found("The requested endpoint does not exist"), &ctx)
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.body_limit_bytes;
    Router::new()
        .route(ROUTE_CHAT, post(chat::chat).fallback(not_found))
        .route(
            ROUTE_BOARDS,
            get(boards::list_boards)
                .post(boards::create_board)
                .fallback(not_found),
        )
        .route(
            "/api/trello/boards/:board_id",
            get(boards::get_board)
                .put(boards::update_board)
                .delete(boards::delete_board)
                .fallback(not_found),
        )
        .route(ROUTE_FORMS, post(forms::generate_form).fallback(not_found))
        .route(
            ROUTE_TRELLO,
            post(trello::execute)
                .get(trello::execute_query)
                .fallback(not_found),
        )
        .route(resources::BOARDS.path, get(resources::boards).fallback(not_found))
        .route(resources::LISTS.path, get(resources::lists).fallback(not_found))
        .route(resources::CARDS.path, get(resources::cards).fallback(not_found))
        .route(resources::LABELS.path, get(resources::labels).fallback(not_found))
        .route(resources::CHECKLISTS.path, get(resources::checklists).fallback(not_found))
        .route(resources::ATTACHMENTS.path, get(resources::attachments).fallback(not_found))
        .route(resources::WORKSPACES.path, get(resources::workspaces).fallback(not_found))
        .route("/api/health", get(health::health))
        .route("/api/metrics", get(health::metrics))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), request::track_request))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
