//! 资源网关：所有后端访问的唯一入口
//!
//! 负责 id 格式校验（不合法 → InvalidInput，400）、后端错误归一为 AppError，
//! 并提供看板的强类型操作。工具层与 HTTP 路由共用同一个网关实例。
//! get 与 list 经过读缓存，写操作使相关种类的缓存失效。

use std::sync::Arc;

use serde_json::Value;

use crate::core::AppError;
use crate::resources::backend::{Fields, ResourceBackend};
use crate::resources::board::{Board, BoardCreate, BoardFilter, BoardUpdate};
use crate::resources::cache::{CacheStats, ReadCache};
use crate::resources::{validate_id, ListScope, Parent, ResourceKind, ResourceRef};

pub struct ResourceGateway {
    backend: Arc<dyn ResourceBackend>,
    cache: ReadCache,
}

fn check_ref(target: &ResourceRef) -> Result<(), AppError> {
    validate_id(target.kind, &target.id)?;
    if let Some(p) = &target.parent {
        validate_id(p.kind, &p.id)?;
    }
    Ok(())
}

impl ResourceGateway {
    pub fn new(backend: Arc<dyn ResourceBackend>) -> Self {
        Self {
            backend,
            cache: ReadCache::disabled(),
        }
    }

    pub fn with_cache(mut self, cache: ReadCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn create(
        &self,
        kind: ResourceKind,
        parent: Option<Parent>,
        fields: Fields,
    ) -> Result<Value, AppError> {
        if let Some(p) = &parent {
            validate_id(p.kind, &p.id)?;
        }
        let created = self.backend.create(kind, parent.as_ref(), fields).await?;
        self.cache.invalidate(kind);
        if kind == ResourceKind::Board {
            // 新看板可能自带默认列表与标签
            self.cache.invalidate(ResourceKind::List);
            self.cache.invalidate(ResourceKind::Label);
        }
        tracing::debug!(kind = kind.label(), id = %created["id"], "Created resource");
        Ok(created)
    }

    pub async fn get(&self, target: &ResourceRef) -> Result<Value, AppError> {
        check_ref(target)?;
        if let Some(hit) = self.cache.get(target) {
            return Ok(hit);
        }
        let value = self.backend.get(target).await?;
        self.cache.put(target, &value);
        Ok(value)
    }

    pub async fn update(&self, target: &ResourceRef, fields: Fields) -> Result<Value, AppError> {
        check_ref(target)?;
        if fields.is_empty() {
            return Err(AppError::invalid(format!(
                "At least one field must be provided to update the {}",
                target.kind.label()
            )));
        }
        let updated = self.backend.update(target, fields).await?;
        self.cache.invalidate(target.kind);
        Ok(updated)
    }

    pub async fn delete(&self, target: &ResourceRef) -> Result<(), AppError> {
        check_ref(target)?;
        self.backend.delete(target).await?;
        // 删除会级联到子资源
        self.cache.clear();
        tracing::debug!(kind = target.kind.label(), id = %target.id, "Deleted resource");
        Ok(())
    }

    pub async fn list(&self, kind: ResourceKind, scope: &ListScope) -> Result<Vec<Value>, AppError> {
        if let ListScope::Under { parent, .. } = scope {
            validate_id(parent.kind, &parent.id)?;
        }
        if let Some(hit) = self.cache.get_list(kind, scope) {
            return Ok(hit);
        }
        let items = self.backend.list(kind, scope).await?;
        self.cache.put_list(kind, scope, &items);
        Ok(items)
    }

    // ---- 看板 ----

    pub async fn create_board(&self, input: BoardCreate) -> Result<Board, AppError> {
        input.validate()?;
        let parent = input
            .id_organization
            .clone()
            .map(|org| Parent::new(ResourceKind::Workspace, org));
        let record = self
            .create(ResourceKind::Board, parent, input.into_fields())
            .await?;
        Board::from_record(record)
    }

    pub async fn get_board(&self, id: &str) -> Result<Board, AppError> {
        let record = self.get(&ResourceRef::new(ResourceKind::Board, id)).await?;
        Board::from_record(record)
    }

    pub async fn update_board(&self, id: &str, input: BoardUpdate) -> Result<Board, AppError> {
        let target = ResourceRef::new(ResourceKind::Board, id);
        // id 校验先于字段校验，保证非法 id 始终是 400 的同一种错误
        check_ref(&target)?;
        let fields = input.into_fields()?;
        let record = self.update(&target, fields).await?;
        Board::from_record(record)
    }

    pub async fn delete_board(&self, id: &str) -> Result<(), AppError> {
        self.delete(&ResourceRef::new(ResourceKind::Board, id)).await
    }

    pub async fn list_boards(&self, filter: BoardFilter) -> Result<Vec<Board>, AppError> {
        let scope = ListScope::Mine {
            filter: filter.as_str().to_string(),
        };
        self.list(ResourceKind::Board, &scope)
            .await?
            .into_iter()
            .map(Board::from_record)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;
    use serde_json::json;

    fn gateway() -> ResourceGateway {
        ResourceGateway::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_board_lifecycle() {
        let gw = gateway();
        let input: BoardCreate = serde_json::from_value(json!({
            "name": "Launch",
            "desc": "q3",
            "prefs_permissionLevel": "private"
        }))
        .unwrap();
        let board = gw.create_board(input).await.unwrap();
        assert_eq!(board.name, "Launch");

        let update: BoardUpdate = serde_json::from_value(json!({
            "prefs_permissionLevel": "org",
            "prefs_background": "green",
            "prefs_backgroundBrightness": "dark"
        }))
        .unwrap();
        let updated = gw.update_board(&board.id, update).await.unwrap();
        assert_eq!(updated.desc, "q3");
        assert_eq!(updated.prefs.permission_level.as_deref(), Some("org"));
        assert_eq!(updated.prefs.background.as_deref(), Some("green"));

        gw.delete_board(&board.id).await.unwrap();
        assert!(matches!(
            gw.get_board(&board.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_are_cached_until_a_write() {
        let gw = ResourceGateway::new(Arc::new(MemoryBackend::new()))
            .with_cache(ReadCache::new(std::time::Duration::from_secs(60), 64));
        let input: BoardCreate = serde_json::from_value(json!({"name": "Cached"})).unwrap();
        let board = gw.create_board(input).await.unwrap();

        gw.get_board(&board.id).await.unwrap();
        gw.get_board(&board.id).await.unwrap();
        let s = gw.cache_stats();
        assert_eq!((s.misses, s.hits), (1, 1));

        let update: BoardUpdate = serde_json::from_value(json!({"name": "Renamed"})).unwrap();
        gw.update_board(&board.id, update).await.unwrap();
        assert_eq!(gw.get_board(&board.id).await.unwrap().name, "Renamed");

        let scope = ListScope::Under {
            parent: Parent::new(ResourceKind::Board, &board.id),
            filter: "all".into(),
        };
        assert_eq!(gw.list(ResourceKind::List, &scope).await.unwrap().len(), 3);
        gw.create(
            ResourceKind::List,
            Some(Parent::new(ResourceKind::Board, &board.id)),
            serde_json::from_value(json!({"name": "Later"})).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(gw.list(ResourceKind::List, &scope).await.unwrap().len(), 4);

        gw.delete_board(&board.id).await.unwrap();
        assert_eq!(gw.cache_stats().entries, 0);
        assert!(matches!(
            gw.get_board(&board.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_vs_absent_ids() {
        let gw = gateway();
        assert!(matches!(
            gw.get_board("invalid-board-id-12345").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            gw.get_board("aaaaaaaaaaaaaaaaaaaaaaaa").await,
            Err(AppError::NotFound(_))
        ));
        // 非法 id 即使更新体为空也报 id 错误
        assert!(matches!(
            gw.update_board("nope", BoardUpdate::default()).await,
            Err(AppError::InvalidInput(m)) if m.contains("Invalid board id")
        ));
    }

    #[tokio::test]
    async fn test_list_boards_by_filter() {
        let gw = gateway();
        for name in ["a", "b"] {
            let input: BoardCreate = serde_json::from_value(json!({"name": name})).unwrap();
            gw.create_board(input).await.unwrap();
        }
        let boards = gw.list_boards(BoardFilter::Open).await.unwrap();
        assert_eq!(boards.len(), 2);
        assert!(gw.list_boards(BoardFilter::Closed).await.unwrap().is_empty());
    }
}
