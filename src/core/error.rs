//! 服务错误类型
//!
//! 所有组件（校验、限流、工具、上游模型、资源后端）最终都归一到 AppError，
//! 由 web 层包装成统一的 ErrorEnvelope（带 requestId）返回给客户端。

use axum::http::StatusCode;
use thiserror::Error;

/// 请求处理过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    /// 缺字段、类型错误、枚举值越界等结构性错误
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// 准入被拒，retry_after_secs 始终 > 0
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// 工具执行失败：流式场景下作为数据回传，不终止请求
    #[error("Tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 模型或资源后端不可用 / 超时
    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// HTTP 状态码映射
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::UnknownTool(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::ToolExecution { .. } | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 错误信封中的 `error` 字段：稳定的短标签
    pub fn label(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "Bad Request",
            AppError::NotFound(_) => "Not Found",
            AppError::RateLimited { .. } => "Rate limit exceeded",
            AppError::ToolExecution { .. } => "Tool execution error",
            AppError::UnknownTool(_) => "Unknown tool",
            AppError::Upstream(_) => "Upstream provider error",
            AppError::UnsupportedMediaType(_) => "Unsupported Media Type",
            AppError::Config(_) => "Internal Server Error",
        }
    }

    /// 可以直接暴露给客户端的说明；服务端错误只给通用描述
    pub fn client_message(&self) -> String {
        match self {
            AppError::InvalidInput(m) | AppError::NotFound(m) | AppError::UnsupportedMediaType(m) => {
                m.clone()
            }
            AppError::RateLimited { retry_after_secs } => format!(
                "Too many requests. Please try again in {retry_after_secs} seconds."
            ),
            AppError::UnknownTool(name) => format!("Tool '{name}' is not registered"),
            AppError::Upstream(_) => "An upstream service is unavailable, please retry later".to_string(),
            AppError::ToolExecution { .. } | AppError::Config(_) => {
                "An unexpected error occurred while processing the request".to_string()
            }
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::RateLimited { retry_after_secs: 3 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::UnsupportedMediaType("text/plain".into()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(AppError::Upstream("down".into()).status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::Upstream("connect to 10.0.0.3:443 refused".into());
        assert!(!err.client_message().contains("10.0.0.3"));
        assert!(err.is_server_error());
    }
}
