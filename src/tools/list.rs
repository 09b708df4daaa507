//! 列表工具

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::AppError;
use crate::resources::{ListScope, Parent, ResourceGateway, ResourceKind, ResourceRef};
use crate::tools::{name_of, success, to_fields, Position, StateFilter, ToolFuture, ToolRegistry, TypedTool};

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateListArgs {
    /// 所在看板 id
    pub board_id: String,
    pub name: String,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListIdArgs {
    pub list_id: String,
}

#[derive(Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub pos: Option<Position>,
    /// 移动到另一个看板
    #[serde(default, rename = "idBoard")]
    pub id_board: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListArgs {
    pub list_id: String,
    #[serde(flatten)]
    pub changes: ListChanges,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListListsArgs {
    pub board_id: String,
    #[serde(default)]
    pub filter: Option<StateFilter>,
}

fn list_ref(id: &str) -> ResourceRef {
    ResourceRef::new(ResourceKind::List, id)
}

fn create_list(gw: Arc<ResourceGateway>, args: CreateListArgs) -> ToolFuture {
    Box::pin(async move {
        if args.name.trim().is_empty() {
            return Err(AppError::invalid("List name is required"));
        }
        let fields = to_fields(&json!({"name": args.name.trim(), "pos": args.pos}))?;
        let parent = Parent::new(ResourceKind::Board, &args.board_id);
        let list = gw.create(ResourceKind::List, Some(parent), fields).await?;
        let message = format!(
            "Successfully created list \"{}\" in board {}",
            name_of(&list),
            args.board_id
        );
        Ok(success("list", list, message))
    })
}

fn get_list(gw: Arc<ResourceGateway>, args: ListIdArgs) -> ToolFuture {
    Box::pin(async move {
        let list = gw.get(&list_ref(&args.list_id)).await?;
        let message = format!("Successfully retrieved list \"{}\"", name_of(&list));
        Ok(success("list", list, message))
    })
}

fn update_list(gw: Arc<ResourceGateway>, args: UpdateListArgs) -> ToolFuture {
    Box::pin(async move {
        if let Some(board) = &args.changes.id_board {
            crate::resources::validate_id(ResourceKind::Board, board)?;
        }
        let fields = to_fields(&args.changes)?;
        let list = gw.update(&list_ref(&args.list_id), fields).await?;
        let message = format!("Successfully updated list \"{}\"", name_of(&list));
        Ok(success("list", list, message))
    })
}

fn delete_list(gw: Arc<ResourceGateway>, args: ListIdArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete(&list_ref(&args.list_id)).await?;
        let message = format!("Successfully deleted list {}", args.list_id);
        Ok(success("listId", json!(args.list_id), message))
    })
}

fn list_lists(gw: Arc<ResourceGateway>, args: ListListsArgs) -> ToolFuture {
    Box::pin(async move {
        let scope = ListScope::Under {
            parent: Parent::new(ResourceKind::Board, &args.board_id),
            filter: args.filter.unwrap_or_default().as_str().to_string(),
        };
        let lists = gw.list(ResourceKind::List, &scope).await?;
        let message = format!(
            "Successfully retrieved {} list(s) from board {}",
            lists.len(),
            args.board_id
        );
        Ok(success("lists", json!(lists), message))
    })
}

async fn set_closed(gw: &ResourceGateway, list_id: &str, closed: bool) -> Result<serde_json::Value, AppError> {
    let changes = ListChanges {
        closed: Some(closed),
        ..ListChanges::default()
    };
    gw.update(&list_ref(list_id), to_fields(&changes)?).await
}

fn archive_list(gw: Arc<ResourceGateway>, args: ListIdArgs) -> ToolFuture {
    Box::pin(async move {
        let list = set_closed(&gw, &args.list_id, true).await?;
        let message = format!("Successfully archived list \"{}\"", name_of(&list));
        Ok(success("list", list, message))
    })
}

fn unarchive_list(gw: Arc<ResourceGateway>, args: ListIdArgs) -> ToolFuture {
    Box::pin(async move {
        let list = set_closed(&gw, &args.list_id, false).await?;
        let message = format!(
            "Successfully unarchived (reopened) list \"{}\"",
            name_of(&list)
        );
        Ok(success("list", list, message))
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createList",
        "Create a new list on a Trello board",
        gw.clone(),
        create_list,
    ));
    registry.register(TypedTool::new(
        "getList",
        "Get the details of a Trello list by its ID",
        gw.clone(),
        get_list,
    ));
    registry.register(TypedTool::new(
        "updateList",
        "Rename, reposition, archive or move a Trello list",
        gw.clone(),
        update_list,
    ));
    registry.register(TypedTool::new(
        "deleteList",
        "Delete a Trello list together with its cards",
        gw.clone(),
        delete_list,
    ));
    registry.register(TypedTool::new(
        "listLists",
        "List the lists on a Trello board",
        gw.clone(),
        list_lists,
    ));
    registry.register(TypedTool::new(
        "archiveList",
        "Archive (close) a Trello list. Archived lists can be restored later.",
        gw.clone(),
        archive_list,
    ));
    registry.register(TypedTool::new(
        "unarchiveList",
        "Restore an archived Trello list",
        gw.clone(),
        unarchive_list,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;
    use crate::tools::build_registry;

    #[tokio::test]
    async fn test_archive_hides_list_from_open_filter() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let r = build_registry(gw);
        let board = r
            .execute("createBoard", json!({"name": "B", "defaultLists": false}))
            .await
            .unwrap();
        let board_id = board["board"]["id"].clone();

        let list = r
            .execute("createList", json!({"boardId": board_id, "name": "Backlog", "pos": "top"}))
            .await
            .unwrap();
        assert_eq!(list["list"]["pos"], "top");
        let list_id = list["list"]["id"].clone();

        let archived = r.execute("archiveList", json!({"listId": list_id})).await.unwrap();
        assert_eq!(archived["list"]["closed"], true);
        assert_eq!(archived["message"], "Successfully archived list \"Backlog\"");

        let open = r.execute("listLists", json!({"boardId": board_id})).await.unwrap();
        assert_eq!(open["lists"].as_array().unwrap().len(), 0);

        r.execute("unarchiveList", json!({"listId": list_id})).await.unwrap();
        let open = r.execute("listLists", json!({"boardId": board_id})).await.unwrap();
        assert_eq!(open["lists"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_list_requires_name() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let r = build_registry(gw);
        let err = r
            .execute("createList", json!({"boardId": "aaaaaaaaaaaaaaaaaaaaaaaa", "name": " "}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
