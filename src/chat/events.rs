//! 对话流事件：编排器按产生顺序发出，编码器逐条序列化为 SSE 帧

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 流结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// 模型主动结束
    Stop,
    /// 达到 llm.max_steps 上限
    MaxSteps,
}

/// 单个流事件（`type` 标签 + 负载）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        message_id: String,
        request_id: String,
    },
    /// 模型文本增量
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    /// 工具结果：成功时带 result，失败时带 error（失败也是数据，不终止流）
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
    },
    /// 上游失败：已发出的事件保留，随后关闭流
    #[serde(rename_all = "camelCase")]
    Error { error_text: String },
    #[serde(rename_all = "camelCase")]
    Done { finish_reason: FinishReason },
}

impl StreamEvent {
    /// 事件类型名（与序列化后的 `type` 字段一致）
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Text { .. } => "text",
            StreamEvent::ToolCall { .. } => "tool-call",
            StreamEvent::ToolResult { .. } => "tool-result",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done { .. } => "done",
        }
    }
}
