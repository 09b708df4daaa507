//! 统一错误信封
//!
//! 任何失败都以 `{error, message, requestId, retryAfter?}` 返回；5xx 只给通用描述，细节写日志。

use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::core::AppError;
use crate::web::request::RequestContext;

/// 放进响应扩展，供请求中间件写入监控
#[derive(Debug, Clone)]
pub struct RecordedError(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub request_id: String,
    /// 限流上限，仅 429 使用
    pub limit: Option<u32>,
}

impl ApiError {
    pub fn new(error: impl Into<AppError>, ctx: &RequestContext) -> Self {
        Self {
            error: error.into(),
            request_id: ctx.request_id.clone(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.error.label().to_string(),
            message: self.error.client_message(),
            request_id: self.request_id.clone(),
            retry_after: match self.error {
                AppError::RateLimited { retry_after_secs } => Some(retry_after_secs),
                _ => None,
            },
        }
    }
}

/// 写入 X-RateLimit-* 头，reset 为 RFC 3339 时间
pub(crate) fn rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_after_secs: u64) {
    let reset_at = chrono::Utc::now() + chrono::Duration::seconds(reset_after_secs as i64);
    let pairs = [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
        ("x-ratelimit-reset", reset_at.to_rfc3339()),
    ];
    for (name, value) in pairs {
        if let Ok(v) = HeaderValue::from_str(&value) {
            headers.insert(name, v);
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if self.error.is_server_error() {
            tracing::error!(request_id = %self.request_id, error = %self.error, "Request failed");
        } else {
            tracing::warn!(request_id = %self.request_id, error = %self.error, "Request rejected");
        }

        let envelope = self.envelope();
        let recorded = RecordedError(format!("{}: {}", envelope.error, envelope.message));
        let retry_after = envelope.retry_after;
        let mut resp = (status, Json(envelope)).into_response();
        if let Some(secs) = retry_after {
            let headers = resp.headers_mut();
            headers.insert("retry-after", HeaderValue::from(secs));
            rate_limit_headers(headers, self.limit.unwrap_or_default(), 0, secs);
        }
        resp.extensions_mut().insert(recorded);
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: "req_abc".into(),
            client_ip: "127.0.0.1".into(),
        }
    }

    #[tokio::test]
    async fn test_rate_limited_envelope_and_headers() {
        let resp = ApiError::new(AppError::RateLimited { retry_after_secs: 42 }, &ctx())
            .with_limit(10)
            .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers()["retry-after"], "42");
        assert_eq!(resp.headers()["x-ratelimit-limit"], "10");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], "0");
        assert!(resp.headers().contains_key("x-ratelimit-reset"));

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["error"], "Rate limit exceeded");
        assert_eq!(v["requestId"], "req_abc");
        assert_eq!(v["retryAfter"], 42);
    }

    #[test]
    fn test_server_error_hides_detail() {
        let err = ApiError::new(AppError::Upstream("db password wrong".into()), &ctx());
        let env = err.envelope();
        assert!(!env.message.contains("password"));
        assert!(env.retry_after.is_none());
    }
}
