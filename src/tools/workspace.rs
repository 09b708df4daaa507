//! 工作区（Trello organization）工具

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AppError;
use crate::resources::{ListScope, ResourceGateway, ResourceKind, ResourceRef};
use crate::tools::{success, to_fields, ToolFuture, ToolRegistry, TypedTool};

#[derive(Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceFields {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, alias = "description")]
    pub desc: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    /// 短名（URL 中使用），省略时由 displayName 生成
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct CreateWorkspaceArgs {
    #[serde(flatten)]
    pub fields: WorkspaceFields,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceIdArgs {
    pub workspace_id: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWorkspaceArgs {
    pub workspace_id: String,
    #[serde(flatten)]
    pub fields: WorkspaceFields,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListWorkspacesArgs {}

fn workspace_ref(id: &str) -> ResourceRef {
    ResourceRef::new(ResourceKind::Workspace, id)
}

fn display_name(ws: &Value) -> &str {
    ws["displayName"].as_str().unwrap_or_default()
}

/// "Product Team" → "productteam"
fn short_name(display: &str) -> String {
    display
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn create_workspace(gw: Arc<ResourceGateway>, args: CreateWorkspaceArgs) -> ToolFuture {
    Box::pin(async move {
        let mut fields = args.fields;
        let display = fields.display_name.as_deref().map(str::trim).unwrap_or_default().to_string();
        if display.is_empty() {
            return Err(AppError::invalid("Workspace displayName is required"));
        }
        if fields.name.is_none() {
            fields.name = Some(short_name(&display));
        }
        fields.display_name = Some(display);
        let ws = gw.create(ResourceKind::Workspace, None, to_fields(&fields)?).await?;
        let message = format!(
            "Successfully created workspace \"{}\" with ID: {}",
            display_name(&ws),
            ws["id"].as_str().unwrap_or_default()
        );
        Ok(success("workspace", ws, message))
    })
}

fn get_workspace(gw: Arc<ResourceGateway>, args: WorkspaceIdArgs) -> ToolFuture {
    Box::pin(async move {
        let ws = gw.get(&workspace_ref(&args.workspace_id)).await?;
        let message = format!("Successfully retrieved workspace \"{}\"", display_name(&ws));
        Ok(success("workspace", ws, message))
    })
}

fn update_workspace(gw: Arc<ResourceGateway>, args: UpdateWorkspaceArgs) -> ToolFuture {
    Box::pin(async move {
        let ws = gw
            .update(&workspace_ref(&args.workspace_id), to_fields(&args.fields)?)
            .await?;
        let message = format!("Successfully updated workspace \"{}\"", display_name(&ws));
        Ok(success("workspace", ws, message))
    })
}

fn delete_workspace(gw: Arc<ResourceGateway>, args: WorkspaceIdArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete(&workspace_ref(&args.workspace_id)).await?;
        let message = format!(
            "Successfully deleted workspace with ID: {}",
            args.workspace_id
        );
        Ok(success("workspaceId", json!(args.workspace_id), message))
    })
}

fn list_workspaces(gw: Arc<ResourceGateway>, _args: ListWorkspacesArgs) -> ToolFuture {
    Box::pin(async move {
        let scope = ListScope::Mine {
            filter: "all".to_string(),
        };
        let workspaces = gw.list(ResourceKind::Workspace, &scope).await?;
        let message = format!("Successfully retrieved {} workspace(s)", workspaces.len());
        Ok(success("workspaces", json!(workspaces), message))
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createWorkspace",
        "Create a new Trello workspace (organization) with a display name, description and website",
        gw.clone(),
        create_workspace,
    ));
    registry.register(TypedTool::new(
        "getWorkspace",
        "Get a Trello workspace by its ID",
        gw.clone(),
        get_workspace,
    ));
    registry.register(TypedTool::new(
        "updateWorkspace",
        "Update a Trello workspace's display name, description or website",
        gw.clone(),
        update_workspace,
    ));
    registry.register(TypedTool::new(
        "deleteWorkspace",
        "Delete a Trello workspace",
        gw.clone(),
        delete_workspace,
    ));
    registry.register(TypedTool::new(
        "listWorkspaces",
        "List the Trello workspaces the user belongs to",
        gw.clone(),
        list_workspaces,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;
    use crate::tools::build_registry;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("Product Team 2"), "productteam2");
    }

    #[tokio::test]
    async fn test_board_inside_workspace() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let r = build_registry(gw);
        let ws = r
            .execute("createWorkspace", json!({"displayName": "Platform"}))
            .await
            .unwrap();
        assert_eq!(ws["workspace"]["name"], "platform");
        let ws_id = ws["workspace"]["id"].clone();

        let board = r
            .execute("createBoard", json!({"name": "Infra", "workspaceId": ws_id}))
            .await
            .unwrap();
        assert_eq!(board["board"]["idOrganization"], ws_id);

        let listed = r.execute("listWorkspaces", json!(null)).await.unwrap();
        assert_eq!(listed["workspaces"].as_array().unwrap().len(), 1);

        let err = r.execute("createWorkspace", json!({"desc": "x"})).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
