//! Mock 补全后端（无需 API Key）
//!
//! MockProvider：按关键词决定是否发起工具调用，本地即可跑通「文本 → tool-call → tool-result → 总结」整条链路。
//! ScriptedProvider：逐轮回放预先写好的增量序列，供编排器与 HTTP 测试使用。

use std::collections::VecDeque;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use regex::Regex;
use serde_json::{json, Value};

use crate::chat::{MessagePart, Role};
use crate::llm::traits::{
    CompletionChunk, CompletionProvider, CompletionRequest, CompletionStream, LlmError,
    ToolCallRequest,
};

/// 每个文本增量最多包含的词数
const WORDS_PER_CHUNK: usize = 3;

/// 把一段文本切成若干增量，保留原有空白
fn chunk_text(text: &str) -> Vec<CompletionChunk> {
    let words: Vec<&str> = text.split_inclusive(' ').collect();
    words
        .chunks(WORDS_PER_CHUNK)
        .map(|w| CompletionChunk::TextDelta(w.concat()))
        .collect()
}

static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static NAMED_RE: OnceLock<Regex> = OnceLock::new();
static CREATE_BOARD_RE: OnceLock<Regex> = OnceLock::new();
static LIST_BOARDS_RE: OnceLock<Regex> = OnceLock::new();

fn quoted_re() -> &'static Regex {
    QUOTED_RE.get_or_init(|| Regex::new(r#"["“'‘]([^"”'’]+)["”'’]"#).unwrap())
}

fn named_re() -> &'static Regex {
    NAMED_RE.get_or_init(|| Regex::new(r"(?i)\b(?:named|called|titled)\s+(\w[\w -]*)").unwrap())
}

fn create_board_re() -> &'static Regex {
    CREATE_BOARD_RE
        .get_or_init(|| Regex::new(r"(?i)\b(create|make|new|add|set up)\b.*\bboard\b").unwrap())
}

fn list_boards_re() -> &'static Regex {
    LIST_BOARDS_RE
        .get_or_init(|| Regex::new(r"(?i)\b(list|show|what|which|my)\b.*\bboards\b").unwrap())
}

/// 关键词驱动的本地模型
#[derive(Debug)]
pub struct MockProvider {
    model: String,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("mock")
    }
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }

    fn board_name(&self, text: &str) -> String {
        if let Some(c) = quoted_re().captures(text) {
            return c[1].trim().to_string();
        }
        if let Some(c) = named_re().captures(text) {
            let name = c[1].trim().trim_end_matches(['.', '!', '?']);
            if !name.is_empty() {
                return name.to_string();
            }
        }
        "New Board".to_string()
    }

    /// 最后一条消息以 tool-result 结尾时，根据结果写总结
    fn summarize(&self, tool_name: &str, result: Option<&Value>, error: Option<&Value>) -> String {
        if let Some(err) = error {
            let reason = err
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| err.to_string());
            return format!("The {tool_name} call on your Trello board failed: {reason}");
        }
        let message = result
            .and_then(|r| r.get("message"))
            .and_then(Value::as_str)
            .map(String::from);
        match message {
            Some(m) => format!("Done! {m}"),
            None => format!("Finished {tool_name} for your board."),
        }
    }

    fn plan(&self, request: &CompletionRequest) -> Vec<CompletionChunk> {
        let last = request.messages.last();

        if let Some(msg) = last.filter(|m| m.role == Role::Assistant) {
            if let Some(MessagePart::ToolResult {
                tool_name,
                result,
                error,
                ..
            }) = msg.parts.last()
            {
                let mut out = chunk_text(&self.summarize(tool_name, result.as_ref(), error.as_ref()));
                out.push(CompletionChunk::Done);
                return out;
            }
        }

        let user_text = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text())
            .unwrap_or_default();
        let has_tool = |name: &str| request.tools.iter().any(|t| t.name == name);

        let mut out = Vec::new();
        if create_board_re().is_match(&user_text) && has_tool("createBoard") {
            let name = self.board_name(&user_text);
            out.extend(chunk_text(&format!("Creating board \"{name}\" now.")));
            out.push(CompletionChunk::ToolCall(ToolCallRequest {
                id: new_call_id(),
                name: "createBoard".to_string(),
                args: json!({ "name": name }),
            }));
        } else if list_boards_re().is_match(&user_text) && has_tool("listBoards") {
            out.extend(chunk_text("Let me look up your boards."));
            out.push(CompletionChunk::ToolCall(ToolCallRequest {
                id: new_call_id(),
                name: "listBoards".to_string(),
                args: json!({ "filter": "open" }),
            }));
        } else {
            out.extend(chunk_text(
                "I can help you manage Trello boards, lists, cards, labels and checklists. \
                 Try asking me to create a board named \"Roadmap\".",
            ));
        }
        out.push(CompletionChunk::Done);
        out
    }
}

pub(crate) fn new_call_id() -> String {
    format!("call_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        let chunks = self.plan(request);
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

type Step = Result<Vec<Result<CompletionChunk, LlmError>>, LlmError>;

/// 按轮回放的脚本后端；每次 stream() 消费一轮，并记录收到的请求
#[derive(Default)]
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    seen: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个增量之前等待 delay（用于模拟慢速上游）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_step(self, chunks: Vec<CompletionChunk>) -> Self {
        self.push_raw(Ok(chunks.into_iter().map(Ok).collect()))
    }

    /// 流中途返回错误
    pub fn push_items(self, items: Vec<Result<CompletionChunk, LlmError>>) -> Self {
        self.push_raw(Ok(items))
    }

    /// stream() 本身返回错误
    pub fn push_failure(self, err: LlmError) -> Self {
        self.push_raw(Err(err))
    }

    fn push_raw(self, step: Step) -> Self {
        if let Ok(mut steps) = self.steps.lock() {
            steps.push_back(step);
        }
        self
    }

    /// 目前为止收到的请求
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }
        let step = self
            .steps
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| Err(LlmError::Request("script exhausted".to_string())))?;

        let out: CompletionStream = match self.delay {
            Some(delay) => Box::pin(stream::iter(step).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })),
            None => Box::pin(stream::iter(step)),
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatMessage;
    use crate::llm::ToolSpec;

    fn request(messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            messages,
            tools: vec![
                ToolSpec {
                    name: "createBoard".into(),
                    description: String::new(),
                    parameters: json!({}),
                },
                ToolSpec {
                    name: "listBoards".into(),
                    description: String::new(),
                    parameters: json!({}),
                },
            ],
        }
    }

    async fn collect(p: &dyn CompletionProvider, req: &CompletionRequest) -> Vec<CompletionChunk> {
        p.stream(req)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_mock_create_board_emits_tool_call() {
        let p = MockProvider::default();
        let req = request(vec![ChatMessage::user(
            "Create a new Trello board named 'Test Board'",
        )]);
        let chunks = collect(&p, &req).await;

        let call = chunks
            .iter()
            .find_map(|c| match c {
                CompletionChunk::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.name, "createBoard");
        assert_eq!(call.args["name"], "Test Board");
        assert!(call.id.starts_with("call_"));
        assert_eq!(chunks.last(), Some(&CompletionChunk::Done));
    }

    #[tokio::test]
    async fn test_mock_summarizes_tool_result() {
        let p = MockProvider::default();
        let req = request(vec![
            ChatMessage::user("create a board called Ops"),
            ChatMessage::new(
                Role::Assistant,
                vec![
                    MessagePart::ToolCall {
                        tool_call_id: Some("call_1".into()),
                        tool_name: "createBoard".into(),
                        args: json!({"name": "Ops"}),
                    },
                    MessagePart::ToolResult {
                        tool_call_id: Some("call_1".into()),
                        tool_name: "createBoard".into(),
                        result: Some(json!({"success": true, "message": "Created board \"Ops\""})),
                        error: None,
                    },
                ],
            ),
        ]);
        let chunks = collect(&p, &req).await;
        let text: String = chunks
            .iter()
            .filter_map(|c| match c {
                CompletionChunk::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Done! Created board \"Ops\"");
        assert!(!chunks.iter().any(|c| matches!(c, CompletionChunk::ToolCall(_))));
    }

    #[tokio::test]
    async fn test_mock_plain_question_has_no_tool_call() {
        let p = MockProvider::default();
        let chunks = collect(&p, &request(vec![ChatMessage::user("hello")])).await;
        assert!(!chunks.iter().any(|c| matches!(c, CompletionChunk::ToolCall(_))));
        assert!(chunks.len() > 2);
    }

    #[tokio::test]
    async fn test_scripted_replays_steps_in_order() {
        let p = ScriptedProvider::new()
            .push_step(vec![CompletionChunk::TextDelta("a".into()), CompletionChunk::Done])
            .push_failure(LlmError::Timeout(1));
        let req = request(vec![ChatMessage::user("x")]);

        let first = collect(&p, &req).await;
        assert_eq!(first.len(), 2);
        assert!(matches!(p.stream(&req).await, Err(LlmError::Timeout(1))));
        assert!(matches!(p.stream(&req).await, Err(LlmError::Request(_))));
        assert_eq!(p.requests().len(), 3);
    }
}
