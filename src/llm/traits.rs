//! 模型补全抽象
//!
//! 编排器只依赖 CompletionProvider：给定上下文返回一个增量流，流中每一项是
//! 文本增量、工具调用信号或结束标记。真实后端（OpenAI 兼容）与测试用脚本后端都实现该 trait。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::chat::ChatMessage;
use crate::core::AppError;

/// 暴露给模型的工具描述（name / description / JSON Schema 参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 模型发出的一次工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: Value,
}

/// 流中的单个增量
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionChunk {
    TextDelta(String),
    ToolCall(ToolCallRequest),
    /// 本轮生成结束
    Done,
}

/// 一次补全请求：系统提示 + 对话上下文 + 可用工具
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, LlmError>> + Send>>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("config error: {0}")]
    Config(String),
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Config(m) => AppError::Config(m),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

/// 补全后端 trait
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 模型名（日志与 start 事件使用）
    fn model(&self) -> &str;

    /// 开始一轮流式生成；返回的流与 request 生命周期无关
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError>;

    /// 累计 token 用量 (prompt, completion)；不统计的后端返回 (0, 0)
    fn token_usage(&self) -> (u64, u64) {
        (0, 0)
    }
}
