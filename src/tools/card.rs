//! 卡片工具

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::AppError;
use crate::resources::{validate_id, ListScope, Parent, ResourceGateway, ResourceKind, ResourceRef};
use crate::tools::{name_of, success, to_fields, Position, StateFilter, ToolFuture, ToolRegistry, TypedTool};

/// 创建与更新共用的卡片字段
#[derive(Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardFields {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "description")]
    pub desc: Option<String>,
    /// 截止时间，ISO 8601
    #[serde(default)]
    pub due: Option<String>,
    #[serde(default)]
    pub due_complete: Option<bool>,
    #[serde(default)]
    pub id_labels: Option<Vec<String>>,
    #[serde(default)]
    pub pos: Option<Position>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardArgs {
    /// 所在列表 id
    #[serde(alias = "idList")]
    pub list_id: String,
    #[serde(flatten)]
    pub fields: CardFields,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardIdArgs {
    pub card_id: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCardArgs {
    pub card_id: String,
    /// 移动到另一个列表
    #[serde(default)]
    pub id_list: Option<String>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(flatten)]
    pub fields: CardFields,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCardsArgs {
    /// 按列表列出；与 boardId 二选一
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub board_id: Option<String>,
    #[serde(default)]
    pub filter: Option<StateFilter>,
}

pub(crate) fn card_ref(id: &str) -> ResourceRef {
    ResourceRef::new(ResourceKind::Card, id)
}

fn check_labels(fields: &CardFields) -> Result<(), AppError> {
    for id in fields.id_labels.iter().flatten() {
        validate_id(ResourceKind::Label, id)?;
    }
    Ok(())
}

fn create_card(gw: Arc<ResourceGateway>, args: CreateCardArgs) -> ToolFuture {
    Box::pin(async move {
        let name = args.fields.name.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() {
            return Err(AppError::invalid("Card name is required"));
        }
        check_labels(&args.fields)?;
        let parent = Parent::new(ResourceKind::List, &args.list_id);
        let card = gw
            .create(ResourceKind::Card, Some(parent), to_fields(&args.fields)?)
            .await?;
        let message = format!(
            "Successfully created card \"{}\" in list {}",
            name_of(&card),
            args.list_id
        );
        Ok(success("card", card, message))
    })
}

fn get_card(gw: Arc<ResourceGateway>, args: CardIdArgs) -> ToolFuture {
    Box::pin(async move {
        let card = gw.get(&card_ref(&args.card_id)).await?;
        let message = format!("Successfully retrieved card \"{}\"", name_of(&card));
        Ok(success("card", card, message))
    })
}

fn update_card(gw: Arc<ResourceGateway>, args: UpdateCardArgs) -> ToolFuture {
    Box::pin(async move {
        check_labels(&args.fields)?;
        let mut fields = to_fields(&args.fields)?;
        if let Some(list) = args.id_list {
            validate_id(ResourceKind::List, &list)?;
            fields.insert("idList".into(), json!(list));
        }
        if let Some(closed) = args.closed {
            fields.insert("closed".into(), json!(closed));
        }
        let card = gw.update(&card_ref(&args.card_id), fields).await?;
        let message = format!("Successfully updated card \"{}\"", name_of(&card));
        Ok(success("card", card, message))
    })
}

fn delete_card(gw: Arc<ResourceGateway>, args: CardIdArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete(&card_ref(&args.card_id)).await?;
        let message = format!("Successfully deleted card {}", args.card_id);
        Ok(success("cardId", json!(args.card_id), message))
    })
}

fn list_cards(gw: Arc<ResourceGateway>, args: ListCardsArgs) -> ToolFuture {
    Box::pin(async move {
        let parent = match (&args.list_id, &args.board_id) {
            (Some(list), _) => Parent::new(ResourceKind::List, list),
            (None, Some(board)) => Parent::new(ResourceKind::Board, board),
            (None, None) => return Err(AppError::invalid("Either listId or boardId is required")),
        };
        let source = format!("{} {}", parent.kind.label(), parent.id);
        let scope = ListScope::Under {
            parent,
            filter: args.filter.unwrap_or_default().as_str().to_string(),
        };
        let cards = gw.list(ResourceKind::Card, &scope).await?;
        let message = format!(
            "Successfully retrieved {} card(s) from {source}",
            cards.len()
        );
        Ok(success("cards", json!(cards), message))
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createCard",
        "Create a new card in a Trello list with a name and optional description, due date, labels and position",
        gw.clone(),
        create_card,
    ));
    registry.register(TypedTool::new(
        "getCard",
        "Get the details of a Trello card by its ID",
        gw.clone(),
        get_card,
    ));
    registry.register(TypedTool::new(
        "updateCard",
        "Update a Trello card: rename, edit description or due date, move to another list, or archive",
        gw.clone(),
        update_card,
    ));
    registry.register(TypedTool::new(
        "deleteCard",
        "Permanently delete a Trello card",
        gw.clone(),
        delete_card,
    ));
    registry.register(TypedTool::new(
        "listCards",
        "List the cards in a Trello list or on a whole board",
        gw.clone(),
        list_cards,
    ));
}
