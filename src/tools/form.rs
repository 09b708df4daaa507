//! 表单工具：让模型为某种资源生成创建 / 更新 / 删除表单，客户端据此渲染对应组件

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::AppError;
use crate::forms::{self, FormAction, ResourceType};
use crate::resources::ResourceGateway;
use crate::tools::{ToolFuture, ToolRegistry, TypedTool};

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormArgs {
    /// create / update / delete
    pub action: FormAction,
    /// 被更新或删除的资源 id
    #[serde(default)]
    pub resource_id: Option<String>,
    /// 父资源 id（例如创建卡片时的列表 id）
    #[serde(default)]
    pub parent_id: Option<String>,
    /// 预填字段
    #[serde(default)]
    pub initial_data: Option<Value>,
}

fn tool_name(resource: ResourceType) -> String {
    let mut noun = resource.as_str().to_string();
    if let Some(first) = noun.get_mut(..1) {
        first.make_ascii_uppercase();
    }
    format!("generate{noun}Form")
}

fn generate(resource: ResourceType, args: FormArgs) -> Result<Value, AppError> {
    if args.action != FormAction::Create && args.resource_id.is_none() {
        return Err(AppError::invalid(format!(
            "resourceId is required to {} a {}",
            args.action.as_str(),
            resource.as_str()
        )));
    }
    let descriptor = forms::generate_by(resource, args.action, &tool_name(resource));
    Ok(json!({
        "success": true,
        "ui": forms::component_name(resource, args.action),
        "formComponent": descriptor.form_component,
        "metadata": descriptor.metadata,
        "action": args.action,
        "resourceId": args.resource_id,
        "parentId": args.parent_id,
        "initialData": args.initial_data.unwrap_or_else(|| json!({})),
        "message": format!("Generated {} {} form", args.action.as_str(), resource.as_str()),
    }))
}

macro_rules! form_handler {
    ($fn_name:ident, $resource:expr) => {
        fn $fn_name(_gw: Arc<ResourceGateway>, args: FormArgs) -> ToolFuture {
            Box::pin(async move { generate($resource, args) })
        }
    };
}

form_handler!(board_form, ResourceType::Board);
form_handler!(list_form, ResourceType::List);
form_handler!(card_form, ResourceType::Card);
form_handler!(workspace_form, ResourceType::Workspace);
form_handler!(label_form, ResourceType::Label);
form_handler!(attachment_form, ResourceType::Attachment);
form_handler!(checklist_form, ResourceType::Checklist);

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    let handlers: [(&'static str, &'static str, fn(Arc<ResourceGateway>, FormArgs) -> ToolFuture); 7] = [
        (
            "generateBoardForm",
            "Generate an interactive form for creating, updating or deleting a Trello board",
            board_form,
        ),
        (
            "generateListForm",
            "Generate an interactive form for creating, updating or deleting a Trello list",
            list_form,
        ),
        (
            "generateCardForm",
            "Generate an interactive form for creating, updating or deleting a Trello card",
            card_form,
        ),
        (
            "generateWorkspaceForm",
            "Generate an interactive form for creating, updating or deleting a Trello workspace",
            workspace_form,
        ),
        (
            "generateLabelForm",
            "Generate an interactive form for creating, updating or deleting a Trello label",
            label_form,
        ),
        (
            "generateAttachmentForm",
            "Generate an interactive form for adding, renaming or deleting a card attachment",
            attachment_form,
        ),
        (
            "generateChecklistForm",
            "Generate an interactive form for creating, updating or deleting a card checklist",
            checklist_form,
        ),
    ];
    for (name, description, handler) in handlers {
        registry.register(TypedTool::new(name, description, gw.clone(), handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;

    fn registry() -> ToolRegistry {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let mut r = ToolRegistry::new();
        register(&mut r, &gw);
        r
    }

    #[test]
    fn test_tool_names_follow_resource() {
        for resource in ResourceType::ALL {
            assert!(registry().get(&tool_name(resource)).is_some());
        }
        assert_eq!(tool_name(ResourceType::Checklist), "generateChecklistForm");
    }

    #[tokio::test]
    async fn test_card_form() {
        let out = registry()
            .execute(
                "generateCardForm",
                json!({"action": "create", "parentId": "aaaaaaaaaaaaaaaaaaaaaaaa", "initialData": {"name": "x"}}),
            )
            .await
            .unwrap();
        assert_eq!(out["ui"], "CardCreationCard");
        assert_eq!(out["message"], "Generated create card form");
        assert_eq!(out["metadata"]["generatedBy"], "generateCardForm");
        assert_eq!(out["initialData"]["name"], "x");
        assert!(out["formComponent"].as_str().unwrap().contains("CardCreationCard"));
    }

    #[tokio::test]
    async fn test_update_needs_resource_id() {
        let err = registry()
            .execute("generateBoardForm", json!({"action": "update"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = registry()
            .execute("generateBoardForm", json!({"action": "archive"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
