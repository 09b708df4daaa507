//! 资源网关：把本服务的 CRUD 契约翻译到外部看板后端
//!
//! - [`ResourceBackend`]：后端 trait（内存实现 / Trello REST 实现）
//! - [`ResourceGateway`]：id 校验、错误归一、看板强类型操作；工具与 HTTP 路由都经由它访问后端

pub mod backend;
pub mod board;
pub mod cache;
pub mod gateway;
pub mod memory;
pub mod trello;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::AppError;

pub use backend::{BackendError, Fields, ResourceBackend};
pub use board::{Board, BoardCreate, BoardFilter, BoardPrefs, BoardUpdate};
pub use cache::{CacheStats, ReadCache};
pub use gateway::ResourceGateway;
pub use memory::MemoryBackend;
pub use trello::TrelloBackend;

/// 后端资源种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Board,
    List,
    Card,
    Label,
    Attachment,
    Checklist,
    CheckItem,
    Workspace,
}

impl ResourceKind {
    /// 人类可读名（用于错误与工具消息）
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Board => "board",
            ResourceKind::List => "list",
            ResourceKind::Card => "card",
            ResourceKind::Label => "label",
            ResourceKind::Attachment => "attachment",
            ResourceKind::Checklist => "checklist",
            ResourceKind::CheckItem => "checklist item",
            ResourceKind::Workspace => "workspace",
        }
    }

    /// 子资源记录里指向该种类父资源的字段名
    pub fn link_field(self) -> &'static str {
        match self {
            ResourceKind::Board => "idBoard",
            ResourceKind::List => "idList",
            ResourceKind::Card => "idCard",
            ResourceKind::Label => "idLabel",
            ResourceKind::Attachment => "idAttachment",
            ResourceKind::Checklist => "idChecklist",
            ResourceKind::CheckItem => "idCheckItem",
            ResourceKind::Workspace => "idOrganization",
        }
    }

    /// 创建时必须挂在哪种父资源下
    pub fn required_parent(self) -> Option<ResourceKind> {
        match self {
            ResourceKind::List | ResourceKind::Label => Some(ResourceKind::Board),
            ResourceKind::Card => Some(ResourceKind::List),
            ResourceKind::Attachment | ResourceKind::Checklist => Some(ResourceKind::Card),
            ResourceKind::CheckItem => Some(ResourceKind::Checklist),
            ResourceKind::Board | ResourceKind::Workspace => None,
        }
    }
}

/// 父资源引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub kind: ResourceKind,
    pub id: String,
}

impl Parent {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// 指向单个资源；parent 仅在后端路径需要时携带（附件、清单项）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
    pub parent: Option<Parent>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            parent: None,
        }
    }

    pub fn under(mut self, parent: Parent) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// 列表范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// 当前账号名下（看板、工作区）
    Mine { filter: String },
    /// 某个父资源下
    Under { parent: Parent, filter: String },
}

impl ListScope {
    pub fn filter(&self) -> &str {
        match self {
            ListScope::Mine { filter } | ListScope::Under { filter, .. } => filter,
        }
    }
}

static ID_RE: OnceLock<Regex> = OnceLock::new();

/// 资源 id 必须是 24 位十六进制；不合法返回 InvalidInput（400），合法但不存在由后端返回 NotFound（404）
pub fn validate_id(kind: ResourceKind, id: &str) -> Result<(), AppError> {
    let re = ID_RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap());
    if re.is_match(id) {
        Ok(())
    } else {
        Err(AppError::invalid(format!(
            "Invalid {} id '{}': expected 24 hexadecimal characters",
            kind.label(),
            id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id(ResourceKind::Board, "5f1a2b3c4d5e6f7a8b9c0d1e").is_ok());
        assert!(validate_id(ResourceKind::Board, "5F1A2B3C4D5E6F7A8B9C0D1E").is_ok());

        for bad in ["invalid-board-id-12345", "", "5f1a2b3c4d5e6f7a8b9c0d1", "zz1a2b3c4d5e6f7a8b9c0d1e"] {
            let err = validate_id(ResourceKind::Board, bad).unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{bad}");
        }
    }

    #[test]
    fn test_required_parent() {
        assert_eq!(ResourceKind::Card.required_parent(), Some(ResourceKind::List));
        assert_eq!(ResourceKind::Board.required_parent(), None);
        assert_eq!(ResourceKind::CheckItem.required_parent(), Some(ResourceKind::Checklist));
    }
}
