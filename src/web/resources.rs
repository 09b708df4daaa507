//! 按资源的只读列表路由：/api/boards、/api/lists、/api/cards 等
//!
//! 查询参数先校验（缺父资源 id、id 格式、过滤值），再限流，最后经工具执行器调用对应的 list 工具。

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::core::AppError;
use crate::resources::{validate_id, BoardFilter, ResourceKind};
use crate::tools::StateFilter;
use crate::web::admit;
use crate::web::error::ApiError;
use crate::web::request::RequestContext;
use crate::web::state::AppState;

/// 过滤参数的取值范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKind {
    None,
    /// 看板过滤，未知值回落到 all
    Board,
    /// open / closed / all，未知值 400
    State,
}

/// 一条只读列表路由
pub struct ReadRoute {
    pub path: &'static str,
    tool: &'static str,
    key: &'static str,
    /// 至少提供其中一个父资源 id
    parents: &'static [(&'static str, ResourceKind)],
    filter: FilterKind,
}

pub static BOARDS: ReadRoute = ReadRoute {
    path: "/api/boards",
    tool: "listBoards",
    key: "boards",
    parents: &[],
    filter: FilterKind::Board,
};

pub static LISTS: ReadRoute = ReadRoute {
    path: "/api/lists",
    tool: "listLists",
    key: "lists",
    parents: &[("boardId", ResourceKind::Board)],
    filter: FilterKind::State,
};

pub static CARDS: ReadRoute = ReadRoute {
    path: "/api/cards",
    tool: "listCards",
    key: "cards",
    parents: &[("boardId", ResourceKind::Board), ("listId", ResourceKind::List)],
    filter: FilterKind::State,
};

pub static LABELS: ReadRoute = ReadRoute {
    path: "/api/labels",
    tool: "listLabels",
    key: "labels",
    parents: &[("boardId", ResourceKind::Board)],
    filter: FilterKind::None,
};

pub static CHECKLISTS: ReadRoute = ReadRoute {
    path: "/api/checklists",
    tool: "listChecklists",
    key: "checklists",
    parents: &[("cardId", ResourceKind::Card)],
    filter: FilterKind::None,
};

pub static ATTACHMENTS: ReadRoute = ReadRoute {
    path: "/api/attachments",
    tool: "listAttachments",
    key: "attachments",
    parents: &[("cardId", ResourceKind::Card)],
    filter: FilterKind::None,
};

pub static WORKSPACES: ReadRoute = ReadRoute {
    path: "/api/workspaces",
    tool: "listWorkspaces",
    key: "workspaces",
    parents: &[],
    filter: FilterKind::None,
};

/// 把查询参数变成 list 工具的参数；任何问题都是 InvalidInput
fn tool_args(route: &ReadRoute, query: &HashMap<String, String>) -> Result<Value, AppError> {
    let mut args = Map::new();
    for (name, kind) in route.parents {
        if let Some(id) = query.get(*name).map(|s| s.trim()).filter(|s| !s.is_empty()) {
            validate_id(*kind, id)?;
            args.insert(name.to_string(), json!(id));
        }
    }
    if args.is_empty() && !route.parents.is_empty() {
        let names: Vec<&str> = route.parents.iter().map(|(name, _)| *name).collect();
        let message = match names.as_slice() {
            [one] => format!("{one} parameter is required"),
            _ => format!("Either {} parameter is required", names.join(" or ")),
        };
        return Err(AppError::invalid(message));
    }

    let raw = query.get("filter").map(|s| s.trim()).filter(|s| !s.is_empty());
    match route.filter {
        FilterKind::None => {}
        FilterKind::Board => {
            let (filter, fell_back) = BoardFilter::parse_lenient(raw);
            if fell_back {
                tracing::warn!(filter = ?raw, "Unknown board filter, using 'all'");
            }
            args.insert("filter".to_string(), json!(filter.as_str()));
        }
        FilterKind::State => {
            let filter: StateFilter = serde_json::from_value(json!(raw.unwrap_or("all")))
                .map_err(|_| AppError::invalid("filter must be one of open, closed, all"))?;
            args.insert("filter".to_string(), json!(filter.as_str()));
        }
    }
    Ok(Value::Object(args))
}

async fn read(
    route: &'static ReadRoute,
    state: Arc<AppState>,
    ctx: RequestContext,
    query: HashMap<String, String>,
) -> Result<Response, ApiError> {
    let args = tool_args(route, &query).map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, route.path)?;

    let mut out = state
        .orchestrator
        .executor()
        .execute(route.tool, args)
        .await
        .map_err(|e| ApiError::new(e, &ctx))?;
    let count = out[route.key].as_array().map_or(0, Vec::len);
    out["count"] = json!(count);
    tracing::debug!(request_id = %ctx.request_id, route = route.path, count, "Resources listed");

    let mut resp = Json(out).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}

type ReadQuery = Query<HashMap<String, String>>;

pub async fn boards(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&BOARDS, state, ctx, query).await
}

pub async fn lists(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&LISTS, state, ctx, query).await
}

pub async fn cards(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&CARDS, state, ctx, query).await
}

pub async fn labels(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&LABELS, state, ctx, query).await
}

pub async fn checklists(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&CHECKLISTS, state, ctx, query).await
}

pub async fn attachments(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&ATTACHMENTS, state, ctx, query).await
}

pub async fn workspaces(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): ReadQuery,
) -> Result<Response, ApiError> {
    read(&WORKSPACES, state, ctx, query).await
}
