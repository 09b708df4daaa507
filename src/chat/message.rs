//! 对话消息模型
//!
//! 与前端 UIMessage 结构一致：一条消息由 role + 有序 parts 组成，part 为封闭的三种类型
//! （text / tool-call / tool-result），由 serde 的 `type` 标签区分。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub const ALL: [&'static str; 3] = ["user", "assistant", "system"];
}

/// 消息片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        tool_name: String,
        #[serde(default = "empty_args")]
        args: Value,
    },
    /// result 与 error 二选一
    #[serde(rename_all = "camelCase")]
    ToolResult {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_call_id: Option<String>,
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
}

fn empty_args() -> Value {
    Value::Object(Default::default())
}

impl MessagePart {
    pub const TYPES: [&'static str; 3] = ["text", "tool-call", "tool-result"];

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    pub fn new(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: None,
            role,
            parts,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![MessagePart::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![MessagePart::text(text)])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![MessagePart::text(text)])
    }

    /// 拼接所有 text part
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// POST /api/chat 请求体
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// 最后一条 user 消息的文本
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(ChatMessage::text)
    }
}
