//! 资源后端 trait 与错误

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::AppError;
use crate::resources::{ListScope, Parent, ResourceKind, ResourceRef};

/// 资源字段（JSON 对象）
pub type Fields = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("{0}")]
    NotFound(String),

    /// 后端拒绝了请求（参数不合法等）
    #[error("{0}")]
    Rejected(String),

    /// 网络错误、超时、5xx
    #[error("{0}")]
    Unavailable(String),
}

impl From<BackendError> for AppError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(m) => AppError::NotFound(m),
            BackendError::Rejected(m) => AppError::InvalidInput(m),
            BackendError::Unavailable(m) => AppError::Upstream(m),
        }
    }
}

/// 看板后端；字段使用 Trello 的规范形状（prefs 为嵌套对象，关联字段为 idXxx）
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn create(
        &self,
        kind: ResourceKind,
        parent: Option<&Parent>,
        fields: Fields,
    ) -> Result<Value, BackendError>;

    async fn get(&self, target: &ResourceRef) -> Result<Value, BackendError>;

    /// 部分更新：只修改 fields 中出现的键，嵌套对象深度合并
    async fn update(&self, target: &ResourceRef, fields: Fields) -> Result<Value, BackendError>;

    async fn delete(&self, target: &ResourceRef) -> Result<(), BackendError>;

    async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<Vec<Value>, BackendError>;
}
