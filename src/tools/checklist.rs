//! 清单与清单项工具

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::AppError;
use crate::resources::{validate_id, ListScope, Parent, ResourceGateway, ResourceKind, ResourceRef};
use crate::tools::{name_of, success, to_fields, Position, ToolFuture, ToolRegistry, TypedTool};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Complete,
    Incomplete,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChecklistArgs {
    pub card_id: String,
    pub name: String,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistIdArgs {
    pub checklist_id: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct ChecklistChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChecklistArgs {
    pub checklist_id: String,
    #[serde(flatten)]
    pub changes: ChecklistChanges,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListChecklistsArgs {
    pub card_id: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemArgs {
    pub checklist_id: String,
    pub name: String,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct ItemChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<CheckState>,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemArgs {
    pub checklist_id: String,
    pub check_item_id: String,
    /// 卡片 id；提供时经由卡片路径更新
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(flatten)]
    pub changes: ItemChanges,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemArgs {
    pub checklist_id: String,
    pub check_item_id: String,
}

fn checklist_ref(id: &str) -> ResourceRef {
    ResourceRef::new(ResourceKind::Checklist, id)
}

fn require_name(name: &str, what: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::invalid(format!("{what} name is required")));
    }
    Ok(())
}

fn create_checklist(gw: Arc<ResourceGateway>, args: CreateChecklistArgs) -> ToolFuture {
    Box::pin(async move {
        require_name(&args.name, "Checklist")?;
        let fields = to_fields(&json!({"name": args.name.trim(), "pos": args.pos}))?;
        let parent = Parent::new(ResourceKind::Card, &args.card_id);
        let checklist = gw.create(ResourceKind::Checklist, Some(parent), fields).await?;
        let message = format!(
            "Successfully created checklist \"{}\" in card {}",
            name_of(&checklist),
            args.card_id
        );
        Ok(success("checklist", checklist, message))
    })
}

fn get_checklist(gw: Arc<ResourceGateway>, args: ChecklistIdArgs) -> ToolFuture {
    Box::pin(async move {
        let checklist = gw.get(&checklist_ref(&args.checklist_id)).await?;
        let message = format!(
            "Successfully retrieved checklist \"{}\" (ID: {})",
            name_of(&checklist),
            args.checklist_id
        );
        Ok(success("checklist", checklist, message))
    })
}

fn update_checklist(gw: Arc<ResourceGateway>, args: UpdateChecklistArgs) -> ToolFuture {
    Box::pin(async move {
        let checklist = gw
            .update(&checklist_ref(&args.checklist_id), to_fields(&args.changes)?)
            .await?;
        let message = format!(
            "Successfully updated checklist \"{}\" (ID: {})",
            name_of(&checklist),
            args.checklist_id
        );
        Ok(success("checklist", checklist, message))
    })
}

fn delete_checklist(gw: Arc<ResourceGateway>, args: ChecklistIdArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete(&checklist_ref(&args.checklist_id)).await?;
        let message = format!(
            "Successfully deleted checklist with ID: {}",
            args.checklist_id
        );
        Ok(success("checklistId", json!(args.checklist_id), message))
    })
}

fn list_checklists(gw: Arc<ResourceGateway>, args: ListChecklistsArgs) -> ToolFuture {
    Box::pin(async move {
        let scope = ListScope::Under {
            parent: Parent::new(ResourceKind::Card, &args.card_id),
            filter: "all".to_string(),
        };
        let checklists = gw.list(ResourceKind::Checklist, &scope).await?;
        let message = format!(
            "Successfully retrieved {} checklists from card {}",
            checklists.len(),
            args.card_id
        );
        Ok(success("checklists", json!(checklists), message))
    })
}

fn create_item(gw: Arc<ResourceGateway>, args: CreateItemArgs) -> ToolFuture {
    Box::pin(async move {
        require_name(&args.name, "Checklist item")?;
        let state = if args.checked.unwrap_or(false) {
            CheckState::Complete
        } else {
            CheckState::Incomplete
        };
        let fields = to_fields(&json!({
            "name": args.name.trim(),
            "state": state,
            "pos": args.pos,
        }))?;
        let parent = Parent::new(ResourceKind::Checklist, &args.checklist_id);
        let item = gw.create(ResourceKind::CheckItem, Some(parent), fields).await?;
        let message = format!(
            "Successfully created checklist item \"{}\" in checklist {}",
            name_of(&item),
            args.checklist_id
        );
        Ok(success("checkItem", item, message))
    })
}

fn update_item(gw: Arc<ResourceGateway>, args: UpdateItemArgs) -> ToolFuture {
    Box::pin(async move {
        validate_id(ResourceKind::Checklist, &args.checklist_id)?;
        let parent = match &args.card_id {
            Some(card) => Parent::new(ResourceKind::Card, card),
            None => Parent::new(ResourceKind::Checklist, &args.checklist_id),
        };
        let target = ResourceRef::new(ResourceKind::CheckItem, &args.check_item_id).under(parent);
        let item = gw.update(&target, to_fields(&args.changes)?).await?;
        let message = format!(
            "Successfully updated checklist item \"{}\" (ID: {})",
            name_of(&item),
            args.check_item_id
        );
        Ok(success("checkItem", item, message))
    })
}

fn delete_item(gw: Arc<ResourceGateway>, args: DeleteItemArgs) -> ToolFuture {
    Box::pin(async move {
        let target = ResourceRef::new(ResourceKind::CheckItem, &args.check_item_id)
            .under(Parent::new(ResourceKind::Checklist, &args.checklist_id));
        gw.delete(&target).await?;
        let message = format!(
            "Successfully deleted checklist item with ID: {}",
            args.check_item_id
        );
        Ok(success("checkItemId", json!(args.check_item_id), message))
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createChecklist",
        "Create a checklist on a Trello card",
        gw.clone(),
        create_checklist,
    ));
    registry.register(TypedTool::new(
        "getChecklist",
        "Get a Trello checklist and its items",
        gw.clone(),
        get_checklist,
    ));
    registry.register(TypedTool::new(
        "updateChecklist",
        "Rename or reposition a Trello checklist",
        gw.clone(),
        update_checklist,
    ));
    registry.register(TypedTool::new(
        "deleteChecklist",
        "Delete a Trello checklist and its items",
        gw.clone(),
        delete_checklist,
    ));
    registry.register(TypedTool::new(
        "listChecklists",
        "List the checklists on a Trello card",
        gw.clone(),
        list_checklists,
    ));
    registry.register(TypedTool::new(
        "createChecklistItem",
        "Add an item to a Trello checklist",
        gw.clone(),
        create_item,
    ));
    registry.register(TypedTool::new(
        "updateChecklistItem",
        "Rename a checklist item or mark it complete / incomplete",
        gw.clone(),
        update_item,
    ));
    registry.register(TypedTool::new(
        "deleteChecklistItem",
        "Delete an item from a Trello checklist",
        gw.clone(),
        delete_item,
    ));
}
