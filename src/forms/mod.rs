//! 表单描述生成
//!
//! 纯函数：(resourceType, action) → FormDescriptor。能力表是一个穷尽 match，
//! 新增资源类型或动作而不补表项会直接编译失败。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 可生成表单的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Board,
    List,
    Card,
    Workspace,
    Label,
    Attachment,
    Checklist,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Board,
        ResourceType::List,
        ResourceType::Card,
        ResourceType::Workspace,
        ResourceType::Label,
        ResourceType::Attachment,
        ResourceType::Checklist,
    ];
    pub const NAMES: [&'static str; 7] = [
        "board",
        "list",
        "card",
        "workspace",
        "label",
        "attachment",
        "checklist",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::Board => "board",
            ResourceType::List => "list",
            ResourceType::Card => "card",
            ResourceType::Workspace => "workspace",
            ResourceType::Label => "label",
            ResourceType::Attachment => "attachment",
            ResourceType::Checklist => "checklist",
        }
    }

    /// 严格匹配小写名
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    fn component_prefix(self) -> &'static str {
        match self {
            ResourceType::Board => "Board",
            ResourceType::List => "List",
            ResourceType::Card => "Card",
            ResourceType::Workspace => "Workspace",
            ResourceType::Label => "Label",
            ResourceType::Attachment => "Attachment",
            ResourceType::Checklist => "Checklist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FormAction {
    Create,
    Update,
    Delete,
}

impl FormAction {
    pub const ALL: [FormAction; 3] = [FormAction::Create, FormAction::Update, FormAction::Delete];
    pub const NAMES: [&'static str; 3] = ["create", "update", "delete"];

    pub fn as_str(self) -> &'static str {
        match self {
            FormAction::Create => "create",
            FormAction::Update => "update",
            FormAction::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }

    fn component_suffix(self) -> &'static str {
        match self {
            FormAction::Create => "CreationCard",
            FormAction::Update => "UpdateCard",
            FormAction::Delete => "DeleteCard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Select,
    Multiselect,
    Checkbox,
    Hidden,
    Url,
    Datetime,
}

/// 单个表单字段
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "<[&str]>::is_empty")]
    pub options: &'static [&'static str],
}

const fn field(name: &'static str, label: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind,
        required,
        options: &[],
    }
}

const fn select(name: &'static str, label: &'static str, options: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind: FieldKind::Select,
        required: false,
        options,
    }
}

const VISIBILITY: &[&str] = &["private", "public", "org"];
const BACKGROUNDS: &[&str] = &["blue", "orange", "green", "red", "purple", "pink", "lime", "sky", "grey"];
const BRIGHTNESS: &[&str] = &["dark", "light"];
const POSITIONS: &[&str] = &["top", "bottom"];
const LABEL_COLORS: &[&str] = &[
    "green", "yellow", "orange", "red", "purple", "blue", "sky", "lime", "pink", "black",
];

const BOARD_CREATE: &[FieldSpec] = &[
    field("name", "Board name", FieldKind::Text, true),
    field("desc", "Description", FieldKind::Textarea, false),
    select("visibility", "Visibility", VISIBILITY),
    select("background", "Background", BACKGROUNDS),
    field("defaultLists", "Create default lists", FieldKind::Checkbox, false),
    field("defaultLabels", "Create default labels", FieldKind::Checkbox, false),
    field("workspaceId", "Workspace", FieldKind::Text, false),
];
const BOARD_UPDATE: &[FieldSpec] = &[
    field("boardId", "Board", FieldKind::Hidden, true),
    field("name", "Board name", FieldKind::Text, false),
    field("desc", "Description", FieldKind::Textarea, false),
    select("visibility", "Visibility", VISIBILITY),
    select("background", "Background", BACKGROUNDS),
    select("backgroundBrightness", "Brightness", BRIGHTNESS),
    field("closed", "Archived", FieldKind::Checkbox, false),
];
const BOARD_DELETE: &[FieldSpec] = &[
    field("boardId", "Board", FieldKind::Hidden, true),
    field("confirm", "I understand this board and its contents will be deleted", FieldKind::Checkbox, true),
];

const LIST_CREATE: &[FieldSpec] = &[
    field("boardId", "Board", FieldKind::Hidden, true),
    field("name", "List name", FieldKind::Text, true),
    select("pos", "Position", POSITIONS),
];
const LIST_UPDATE: &[FieldSpec] = &[
    field("listId", "List", FieldKind::Hidden, true),
    field("name", "List name", FieldKind::Text, false),
    select("pos", "Position", POSITIONS),
    field("closed", "Archived", FieldKind::Checkbox, false),
];
const LIST_DELETE: &[FieldSpec] = &[
    field("listId", "List", FieldKind::Hidden, true),
    field("confirm", "I understand this list and its cards will be deleted", FieldKind::Checkbox, true),
];

const CARD_CREATE: &[FieldSpec] = &[
    field("listId", "List", FieldKind::Hidden, true),
    field("name", "Card title", FieldKind::Text, true),
    field("desc", "Description", FieldKind::Textarea, false),
    field("due", "Due date", FieldKind::Datetime, false),
    field("idLabels", "Labels", FieldKind::Multiselect, false),
    select("pos", "Position", POSITIONS),
];
const CARD_UPDATE: &[FieldSpec] = &[
    field("cardId", "Card", FieldKind::Hidden, true),
    field("name", "Card title", FieldKind::Text, false),
    field("desc", "Description", FieldKind::Textarea, false),
    field("due", "Due date", FieldKind::Datetime, false),
    field("dueComplete", "Completed", FieldKind::Checkbox, false),
    field("idList", "Move to list", FieldKind::Text, false),
    field("closed", "Archived", FieldKind::Checkbox, false),
];
const CARD_DELETE: &[FieldSpec] = &[
    field("cardId", "Card", FieldKind::Hidden, true),
    field("confirm", "I understand this card will be deleted", FieldKind::Checkbox, true),
];

const WORKSPACE_CREATE: &[FieldSpec] = &[
    field("displayName", "Workspace name", FieldKind::Text, true),
    field("desc", "Description", FieldKind::Textarea, false),
    field("website", "Website", FieldKind::Url, false),
];
const WORKSPACE_UPDATE: &[FieldSpec] = &[
    field("workspaceId", "Workspace", FieldKind::Hidden, true),
    field("displayName", "Workspace name", FieldKind::Text, false),
    field("desc", "Description", FieldKind::Textarea, false),
    field("website", "Website", FieldKind::Url, false),
];
const WORKSPACE_DELETE: &[FieldSpec] = &[
    field("workspaceId", "Workspace", FieldKind::Hidden, true),
    field("confirm", "I understand this workspace will be deleted", FieldKind::Checkbox, true),
];

const LABEL_CREATE: &[FieldSpec] = &[
    field("boardId", "Board", FieldKind::Hidden, true),
    field("name", "Label name", FieldKind::Text, false),
    FieldSpec {
        name: "color",
        label: "Color",
        kind: FieldKind::Select,
        required: true,
        options: LABEL_COLORS,
    },
];
const LABEL_UPDATE: &[FieldSpec] = &[
    field("labelId", "Label", FieldKind::Hidden, true),
    field("name", "Label name", FieldKind::Text, false),
    select("color", "Color", LABEL_COLORS),
];
const LABEL_DELETE: &[FieldSpec] = &[
    field("labelId", "Label", FieldKind::Hidden, true),
    field("confirm", "I understand this label will be removed from all cards", FieldKind::Checkbox, true),
];

const ATTACHMENT_CREATE: &[FieldSpec] = &[
    field("cardId", "Card", FieldKind::Hidden, true),
    field("url", "Link", FieldKind::Url, true),
    field("name", "Name", FieldKind::Text, false),
];
const ATTACHMENT_UPDATE: &[FieldSpec] = &[
    field("cardId", "Card", FieldKind::Hidden, true),
    field("attachmentId", "Attachment", FieldKind::Hidden, true),
    field("name", "Name", FieldKind::Text, false),
];
const ATTACHMENT_DELETE: &[FieldSpec] = &[
    field("cardId", "Card", FieldKind::Hidden, true),
    field("attachmentId", "Attachment", FieldKind::Hidden, true),
    field("confirm", "I understand this attachment will be deleted", FieldKind::Checkbox, true),
];

const CHECKLIST_CREATE: &[FieldSpec] = &[
    field("cardId", "Card", FieldKind::Hidden, true),
    field("name", "Checklist name", FieldKind::Text, true),
    select("pos", "Position", POSITIONS),
];
const CHECKLIST_UPDATE: &[FieldSpec] = &[
    field("checklistId", "Checklist", FieldKind::Hidden, true),
    field("name", "Checklist name", FieldKind::Text, false),
    select("pos", "Position", POSITIONS),
];
const CHECKLIST_DELETE: &[FieldSpec] = &[
    field("checklistId", "Checklist", FieldKind::Hidden, true),
    field("confirm", "I understand this checklist and its items will be deleted", FieldKind::Checkbox, true),
];

/// 能力表
fn fields_for(resource: ResourceType, action: FormAction) -> &'static [FieldSpec] {
    use FormAction::*;
    use ResourceType::*;
    match (resource, action) {
        (Board, Create) => BOARD_CREATE,
        (Board, Update) => BOARD_UPDATE,
        (Board, Delete) => BOARD_DELETE,
        (List, Create) => LIST_CREATE,
        (List, Update) => LIST_UPDATE,
        (List, Delete) => LIST_DELETE,
        (Card, Create) => CARD_CREATE,
        (Card, Update) => CARD_UPDATE,
        (Card, Delete) => CARD_DELETE,
        (Workspace, Create) => WORKSPACE_CREATE,
        (Workspace, Update) => WORKSPACE_UPDATE,
        (Workspace, Delete) => WORKSPACE_DELETE,
        (Label, Create) => LABEL_CREATE,
        (Label, Update) => LABEL_UPDATE,
        (Label, Delete) => LABEL_DELETE,
        (Attachment, Create) => ATTACHMENT_CREATE,
        (Attachment, Update) => ATTACHMENT_UPDATE,
        (Attachment, Delete) => ATTACHMENT_DELETE,
        (Checklist, Create) => CHECKLIST_CREATE,
        (Checklist, Update) => CHECKLIST_UPDATE,
        (Checklist, Delete) => CHECKLIST_DELETE,
    }
}

/// 前端渲染用的组件名，如 BoardCreationCard
pub fn component_name(resource: ResourceType, action: FormAction) -> String {
    format!("{}{}", resource.component_prefix(), action.component_suffix())
}

/// 生成结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDescriptor {
    /// 序列化后的结构描述
    pub form_component: String,
    pub metadata: Value,
}

pub fn generate(resource: ResourceType, action: FormAction) -> FormDescriptor {
    generate_by(resource, action, "generate-form")
}

/// generated_by 标明调用方（HTTP 路由或具体工具名）
pub fn generate_by(resource: ResourceType, action: FormAction, generated_by: &str) -> FormDescriptor {
    let component = component_name(resource, action);
    let fields = fields_for(resource, action);
    let noun = resource.component_prefix();
    let (title, submit) = match action {
        FormAction::Create => (format!("Create {noun}"), "Create"),
        FormAction::Update => (format!("Update {noun}"), "Save changes"),
        FormAction::Delete => (format!("Delete {noun}"), "Delete"),
    };

    let descriptor = json!({
        "component": component,
        "resourceType": resource,
        "action": action,
        "title": title,
        "submitLabel": submit,
        "fields": fields,
    });

    FormDescriptor {
        form_component: descriptor.to_string(),
        metadata: json!({
            "component": component,
            "resourceType": resource,
            "action": action,
            "fieldCount": fields.len(),
            "destructive": action == FormAction::Delete,
            "generatedBy": generated_by,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }),
    }
}
