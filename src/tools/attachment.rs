//! 附件工具（链接附件）

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

use crate::core::AppError;
use crate::resources::{ListScope, Parent, ResourceGateway, ResourceKind, ResourceRef};
use crate::tools::{name_of, success, to_fields, ToolFuture, ToolRegistry, TypedTool};

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAttachmentArgs {
    pub card_id: String,
    /// http(s) 链接
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentArgs {
    pub card_id: String,
    pub attachment_id: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListAttachmentsArgs {
    pub card_id: String,
}

fn attachment_ref(args: &AttachmentArgs) -> ResourceRef {
    ResourceRef::new(ResourceKind::Attachment, &args.attachment_id)
        .under(Parent::new(ResourceKind::Card, &args.card_id))
}

fn create_attachment(gw: Arc<ResourceGateway>, args: CreateAttachmentArgs) -> ToolFuture {
    Box::pin(async move {
        let url = args.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AppError::invalid("Attachment url must be an http(s) link"));
        }
        let name = args.name.as_deref().unwrap_or(url);
        let fields = to_fields(&json!({"url": url, "name": name, "mimeType": args.mime_type}))?;
        let parent = Parent::new(ResourceKind::Card, &args.card_id);
        let attachment = gw.create(ResourceKind::Attachment, Some(parent), fields).await?;
        let message = format!(
            "Successfully attached \"{}\" to card {}",
            name_of(&attachment),
            args.card_id
        );
        Ok(success("attachment", attachment, message))
    })
}

fn get_attachment(gw: Arc<ResourceGateway>, args: AttachmentArgs) -> ToolFuture {
    Box::pin(async move {
        let attachment = gw.get(&attachment_ref(&args)).await?;
        let message = format!(
            "Successfully retrieved attachment \"{}\" (ID: {})",
            name_of(&attachment),
            args.attachment_id
        );
        Ok(success("attachment", attachment, message))
    })
}

fn delete_attachment(gw: Arc<ResourceGateway>, args: AttachmentArgs) -> ToolFuture {
    Box::pin(async move {
        gw.delete(&attachment_ref(&args)).await?;
        let message = format!(
            "Successfully deleted attachment with ID: {}",
            args.attachment_id
        );
        Ok(success("attachmentId", json!(args.attachment_id), message))
    })
}

fn list_attachments(gw: Arc<ResourceGateway>, args: ListAttachmentsArgs) -> ToolFuture {
    Box::pin(async move {
        let scope = ListScope::Under {
            parent: Parent::new(ResourceKind::Card, &args.card_id),
            filter: "all".to_string(),
        };
        let attachments = gw.list(ResourceKind::Attachment, &scope).await?;
        let message = format!(
            "Successfully retrieved {} attachments from card {}",
            attachments.len(),
            args.card_id
        );
        Ok(success("attachments", json!(attachments), message))
    })
}

pub fn register(registry: &mut ToolRegistry, gw: &Arc<ResourceGateway>) {
    registry.register(TypedTool::new(
        "createAttachment",
        "Attach a link to a Trello card",
        gw.clone(),
        create_attachment,
    ));
    registry.register(TypedTool::new(
        "getAttachment",
        "Get an attachment of a Trello card",
        gw.clone(),
        get_attachment,
    ));
    registry.register(TypedTool::new(
        "deleteAttachment",
        "Delete an attachment from a Trello card",
        gw.clone(),
        delete_attachment,
    ));
    registry.register(TypedTool::new(
        "listAttachments",
        "List the attachments of a Trello card",
        gw.clone(),
        list_attachments,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryBackend;
    use crate::tools::build_registry;

    #[tokio::test]
    async fn test_attach_and_list() {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let r = build_registry(gw);
        let board = r.execute("createBoard", json!({"name": "B"})).await.unwrap();
        let lists = r
            .execute("listLists", json!({"boardId": board["board"]["id"]}))
            .await
            .unwrap();
        let card = r
            .execute("createCard", json!({"listId": lists["lists"][0]["id"], "name": "c"}))
            .await
            .unwrap();
        let card_id = card["card"]["id"].clone();

        let err = r
            .execute("createAttachment", json!({"cardId": card_id, "url": "ftp://x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let created = r
            .execute(
                "createAttachment",
                json!({"cardId": card_id, "url": "https://example.com/spec.pdf", "name": "spec"}),
            )
            .await
            .unwrap();
        let attachment_id = created["attachment"]["id"].clone();

        let listed = r
            .execute("listAttachments", json!({"cardId": card_id}))
            .await
            .unwrap();
        assert_eq!(listed["attachments"][0]["name"], "spec");

        r.execute(
            "deleteAttachment",
            json!({"cardId": card_id, "attachmentId": attachment_id}),
        )
        .await
        .unwrap();
        let listed = r
            .execute("listAttachments", json!({"cardId": card_id}))
            .await
            .unwrap();
        assert_eq!(listed["attachments"].as_array().unwrap().len(), 0);
    }
}
