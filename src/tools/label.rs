//! 标签工具，含给卡片加/移除标签

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AppError;
use crate::resources::{ListScope, Parent, ResourceGateway, ResourceKind, ResourceRef};
use crate::tools::card::card_ref;
use crate::tools::{name_of, success, to_fields, ToolFuture, ToolRegistry, TypedTool};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LabelColor {
    Green,
    Yellow,
    Orange,
    Red,
    Purple,
    Blue,
    Sky,
    Lime,
    Pink,
    Black,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabelArgs {
    pub board_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// 省略表示无颜色
    #[serde(default)]
    pub color: Option<LabelColor>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelIdArgs {
    pub label_id: String,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct LabelChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<LabelColor>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabelArgs {
    pub label_id: String,
    #[serde(flatten)]
    pub changes: LabelChanges,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListLabelsArgs {
    pub board_id: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CardLabelArgs {
    pub card_id: String,
    pub label_id: String,
}

fn label_ref(id: &str) -> ResourceRef {
    ResourceRef::new(ResourceKind::Label, id)
}

fn color_of(label: &Value) -> &str {
    label["color"].as_str().unwrap_or("none")
}

fn create_label(gw: Arc<ResourceGateway>, args: CreateLabelArgs) -> ToolFuture {
    Box::pin(async move {
        let fields = to_fields(&json!({"name": args.name, "color": args.color}))?;
        let parent = Parent::new(ResourceKind::Board, &args.board_id);
        let label = gw.create(ResourceKind::Label, Some(parent), fields).await?;
        let message = format!(
            "Successfully created label \"{}\" with color {} in board {}",
            name_of(&label),
            color_of(&label),
            args.board_id
        );
        Ok(success("label", label, message))
    })
}

fn get_label(gw: Arc<ResourceGateway>, args: LabelIdArgs) -> ToolFuture {
    Box::pin(async move {
        let label = gw.get(&label_ref(&args.label_id)).await?;
        let message = format!(
            "Successfully retrieved label \"{}\" (ID: {})",
            name_of(&label),
            args.label_id
        );
        Ok(success("label", label, message))
    })
}

fn update_label(gw: Arc<ResourceGateway>, args: UpdateLabelArgs) -> ToolFuture {
    Box::pin(async move {
        let label = gw
            .update(&label_ref(&args.label_id), to_fields(&args.changes)?)
            .await?;
        let message = format!(
            "Successfully updated label \"{}\" (ID: {})",
            name_of(&label),
            args.label_id
        );
        Ok(success("label", label, message))
    })
}

fn delete_label(gw: Arc<ResourceGateway>, args: LabelIdArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete(&label_ref(&args.label_id)).await?;
        let message = format!("Successfully deleted label with ID: {}", args.label_id);
        Ok(success("labelId", json!(args.label_id), message))
    })
}

fn list_labels(gw: Arc<ResourceGateway>, args: ListLabelsArgs) -> ToolFuture {
    Box::pin(async move {
        let scope = ListScope::Under {
            parent: Parent::new(ResourceKind::Board, &args.board_id),
            filter: "all".to_string(),
        };
        let labels = gw.list(ResourceKind::Label, &scope).await?;
        let message = format!(
            "Successfully retrieved {} label(s) from board {}",
            labels.len(),
            args.board_id
        );
        Ok(success("labels", json!(labels), message))
    })
}

/// 读出卡片当前的 idLabels
async fn card_labels(gw: &ResourceGateway, card_id: &str) -> Result<Vec<String>, AppError> {
    let card = gw.get(&card_ref(card_id)).await?;
    Ok(card["idLabels"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default())
}

async fn write_labels(gw: &ResourceGateway, card_id: &str, labels: Vec<String>) -> Result<Value, AppError> {
    let mut fields = crate::resources::Fields::new();
    fields.insert("idLabels".into(), json!(labels));
    gw.update(&card_ref(card_id), fields).await
}

fn add_label_to_card(gw: Arc<ResourceGateway>, args: CardLabelArgs) -> ToolFuture {
    Box::pin(async move {
        let label = gw.get(&label_ref(&args.label_id)).await?;
        let mut labels = card_labels(&gw, &args.card_id).await?;
        if labels.contains(&args.label_id) {
            return Err(AppError::invalid(format!(
                "Label {} is already on card {}",
                args.label_id, args.card_id
            )));
        }
        labels.push(args.label_id.clone());
        write_labels(&gw, &args.card_id, labels).await?;
        let mut out = success(
            "label",
            label,
            format!(
                "Successfully added label {} to card {}",
                args.label_id, args.card_id
            ),
        );
        out["cardId"] = json!(args.card_id);
        out["labelId"] = json!(args.label_id);
        Ok(out)
    })
}

fn remove_label_from_card(gw: Arc<ResourceGateway>, args: CardLabelArgs) -> ToolFuture {
    Box::pin(async move {
        crate::resources::validate_id(ResourceKind::Label, &args.label_id)?;
        let mut labels = card_labels(&gw, &args.card_id).await?;
        let before = labels.len();
        labels.retain(|id| id != &args.label_id);
        if labels.len() == before {
            return Err(AppError::not_found(format!(
                "Label {} is not on card {}",
                args.label_id, args.card_id
            )));
        }
        write_labels(&gw, &args.card_id, labels).await?;
        let mut out = success(
            "cardId",
            json!(args.card_id),
            format!(
                "Successfully removed label {} from card {}",
                args.label_id, args.card_id
            ),
        );
        out["labelId"] = json!(args.label_id);
        Ok(out)
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createLabel",
        "Create a label on a Trello board with an optional name and color",
        gw.clone(),
        create_label,
    ));
    registry.register(TypedTool::new(
        "getLabel",
        "Get a Trello label by its ID",
        gw.clone(),
        get_label,
    ));
    registry.register(TypedTool::new(
        "updateLabel",
        "Rename or recolor a Trello label",
        gw.clone(),
        update_label,
    ));
    registry.register(TypedTool::new(
        "deleteLabel",
        "Delete a Trello label from its board",
        gw.clone(),
        delete_label,
    ));
    registry.register(TypedTool::new(
        "listLabels",
        "List the labels defined on a Trello board",
        gw.clone(),
        list_labels,
    ));
    registry.register(TypedTool::new(
        "addLabelToCard",
        "Add a label to a Trello card. The label must exist on the same board as the card.",
        gw.clone(),
        add_label_to_card,
    ));
    registry.register(TypedTool::new(
        "removeLabelFromCard",
        "Remove a label from a Trello card",
        gw.clone(),
        remove_label_from_card,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;
    use crate::tools::build_registry;

    #[tokio::test]
    async fn test_label_round_trip_on_card() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let r = build_registry(gw);
        let board = r
            .execute("createBoard", json!({"name": "B", "defaultLabels": false}))
            .await
            .unwrap();
        let board_id = board["board"]["id"].clone();
        let lists = r.execute("listLists", json!({"boardId": board_id})).await.unwrap();
        let card = r
            .execute("createCard", json!({"listId": lists["lists"][0]["id"], "name": "c"}))
            .await
            .unwrap();
        let card_id = card["card"]["id"].clone();

        let label = r
            .execute("createLabel", json!({"boardId": board_id, "name": "urgent", "color": "red"}))
            .await
            .unwrap();
        assert_eq!(
            label["message"],
            format!(
                "Successfully created label \"urgent\" with color red in board {}",
                board_id.as_str().unwrap()
            )
        );
        let label_id = label["label"]["id"].clone();

        let args = json!({"cardId": card_id, "labelId": label_id});
        r.execute("addLabelToCard", args.clone()).await.unwrap();
        let err = r.execute("addLabelToCard", args.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let fetched = r.execute("getCard", json!({"cardId": card_id})).await.unwrap();
        assert_eq!(fetched["card"]["idLabels"], json!([label_id]));

        r.execute("removeLabelFromCard", args.clone()).await.unwrap();
        let err = r.execute("removeLabelFromCard", args).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_unknown_color() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let r = build_registry(gw);
        let err = r
            .execute(
                "createLabel",
                json!({"boardId": "aaaaaaaaaaaaaaaaaaaaaaaa", "color": "magenta"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
