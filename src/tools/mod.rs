//! 工具层：模型可调用的看板操作
//!
//! 每个资源一个子模块，参数用强类型 struct 声明（serde 校验 + schemars 导出 schema），
//! 执行时统一经由 ResourceGateway 访问后端。`build_registry` 注册全部工具。

pub mod attachment;
pub mod board;
pub mod card;
pub mod checklist;
pub mod executor;
pub mod form;
pub mod label;
pub mod list;
pub mod registry;
pub mod schema;
pub mod workspace;

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AppError;
use crate::resources::{Fields, ResourceGateway};

pub use executor::{error_payload, ToolExecutor, ToolOutcome};
pub use registry::{Tool, ToolFuture, ToolRegistry, TypedTool};
pub use schema::schema_value;

/// 注册全部看板工具与表单工具
pub fn build_registry(gateway: Arc<ResourceGateway>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    board::register(&mut registry, &gateway);
    list::register(&mut registry, &gateway);
    card::register(&mut registry, &gateway);
    label::register(&mut registry, &gateway);
    attachment::register(&mut registry, &gateway);
    checklist::register(&mut registry, &gateway);
    workspace::register(&mut registry, &gateway);
    form::register(&mut registry, &gateway);
    tracing::debug!(count = registry.len(), "Tool registry built");
    registry
}

/// 成功负载：`{success: true, <key>: value, message}`
pub(crate) fn success(key: &str, value: Value, message: String) -> Value {
    let mut out = json!({"success": true, "message": message});
    out[key] = value;
    out
}

/// 把可选字段组成的 patch 转为后端字段，None 字段被丢弃
pub(crate) fn to_fields<T: Serialize>(patch: &T) -> Result<Fields, AppError> {
    match serde_json::to_value(patch) {
        Ok(Value::Object(map)) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        Ok(_) => Ok(Fields::new()),
        Err(e) => Err(AppError::invalid(format!("Invalid fields: {e}"))),
    }
}

pub(crate) fn name_of(record: &Value) -> &str {
    record["name"].as_str().unwrap_or_default()
}

/// 位置：`top` / `bottom` 或正数
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Position {
    Named(NamedPosition),
    Index(f64),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NamedPosition {
    Top,
    Bottom,
}

/// 列表、卡片的归档过滤
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;

    #[test]
    fn test_catalogue_is_complete() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let names = build_registry(gw).tool_names();
        for expected in [
            "createBoard",
            "listBoards",
            "archiveList",
            "createCard",
            "addLabelToCard",
            "removeLabelFromCard",
            "createAttachment",
            "createChecklistItem",
            "updateChecklistItem",
            "listWorkspaces",
            "generateBoardForm",
            "generateChecklistForm",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
        assert_eq!(names.len(), 48);
    }

    #[test]
    fn test_to_fields_drops_absent_values() {
        #[derive(Serialize)]
        struct Patch {
            name: Option<String>,
            closed: Option<bool>,
        }
        let f = to_fields(&Patch {
            name: None,
            closed: Some(true),
        })
        .unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f["closed"], true);
    }
}
