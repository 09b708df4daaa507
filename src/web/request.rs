//! 请求上下文中间件：分配 requestId、识别客户端 IP、记录请求日志与统计

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::web::error::RecordedError;
use crate::web::state::AppState;

/// 依次尝试的代理头
const CLIENT_IP_HEADERS: [&str; 4] = ["x-forwarded-for", "x-real-ip", "x-client-ip", "cf-connecting-ip"];
const FALLBACK_CLIENT: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: String,
}

impl RequestContext {
    pub fn new(headers: &HeaderMap) -> Self {
        Self {
            request_id: new_request_id(),
            client_ip: client_ip(headers),
        }
    }
}

pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

/// 取第一个合法的 IP；x-forwarded-for 只看最左侧（原始客户端）
pub fn client_ip(headers: &HeaderMap) -> String {
    CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name)?.to_str().ok())
        .filter_map(|raw| raw.split(',').next().map(str::trim))
        .find(|ip| ip.parse::<IpAddr>().is_ok())
        .unwrap_or(FALLBACK_CLIENT)
        .to_string()
}

pub async fn track_request(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let started = Instant::now();
    let ctx = RequestContext::new(req.headers());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::info!(request_id = %ctx.request_id, %method, route = %path, client = %ctx.client_ip, "Request started");

    req.extensions_mut().insert(ctx.clone());
    let mut resp = next.run(req).await;

    if let Ok(v) = HeaderValue::from_str(&ctx.request_id) {
        resp.headers_mut().insert("x-request-id", v);
    }
    let elapsed = started.elapsed();
    let status = resp.status();
    state.monitor.record_request(status.as_u16(), elapsed);
    if let Some(RecordedError(message)) = resp.extensions().get::<RecordedError>() {
        state.monitor.record_error(&ctx.request_id, &ctx.client_ip, message);
    }
    tracing::info!(
        request_id = %ctx.request_id,
        status = status.as_u16(),
        duration_ms = elapsed.as_millis() as u64,
        "Request finished"
    );
    resp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn test_client_ip_precedence() {
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "203.0.113.5, 10.0.0.1"), ("x-real-ip", "10.0.0.9")])),
            "203.0.113.5"
        );
        assert_eq!(
            client_ip(&headers(&[("x-forwarded-for", "garbage"), ("x-real-ip", "10.0.0.9")])),
            "10.0.0.9"
        );
        assert_eq!(client_ip(&headers(&[("cf-connecting-ip", "::1")])), "::1");
        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
    }

    #[test]
    fn test_request_id_shape() {
        let id = new_request_id();
        assert!(id.starts_with("req_"));
        assert_eq!(id.len(), 4 + 32);
    }
}
