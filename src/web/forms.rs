//! POST /api/ui/generate-form

use std::sync::Arc;

use axum::extract::rejection::BytesRejection;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;

use crate::forms;
use crate::validation::validate_form_request;
use crate::web::error::ApiError;
use crate::web::request::RequestContext;
use crate::web::state::AppState;
use crate::web::{admit, json_body, ROUTE_FORMS};

pub async fn generate_form(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let request = json_body(&headers, body)
        .and_then(|value| validate_form_request(&value))
        .map_err(|e| ApiError::new(e, &ctx))?;
    let admitted = admit(&state, &ctx, ROUTE_FORMS)?;

    let descriptor = forms::generate(request.resource_type, request.action);
    tracing::debug!(
        request_id = %ctx.request_id,
        resource_type = request.resource_type.as_str(),
        action = request.action.as_str(),
        "Form descriptor generated"
    );
    let mut resp = Json(descriptor).into_response();
    admitted.apply(resp.headers_mut());
    Ok(resp)
}
