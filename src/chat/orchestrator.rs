//! 生成编排器
//!
//! 每个请求一条逻辑序列：Start → (模型增量 → [工具调用 → 工具结果])* → Done | Error。
//! 事件按产生顺序写入 mpsc 通道；同一轮中的多个工具调用严格串行执行。
//! 客户端断开（接收端被丢弃）时放弃模型流；正在执行的工具调用允许完成，结果记日志后丢弃。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::chat::events::{FinishReason, StreamEvent};
use crate::chat::message::{ChatMessage, ChatRequest, MessagePart, Role};
use crate::core::AppError;
use crate::llm::{CompletionChunk, CompletionProvider, CompletionRequest, LlmError};
use crate::tools::ToolExecutor;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that manages Trello boards, lists, cards, labels, attachments, checklists and workspaces. \
Use the available tools to read or change the user's boards, and use the generate*Form tools when the user wants to fill in details through a form. \
After a tool call, tell the user what happened in one or two sentences.";

const UPSTREAM_ERROR_TEXT: &str = "The assistant is temporarily unavailable. Please try again.";

/// 终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Done,
    Failed,
    /// 客户端已断开
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub phase: RunPhase,
    pub steps: usize,
    pub tool_calls: usize,
}

/// 一次生成的标识
#[derive(Debug, Clone)]
pub struct RunContext {
    pub request_id: String,
    pub message_id: String,
}

impl RunContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            message_id: new_message_id(),
        }
    }
}

/// "msg_" + 16 位字母数字
pub fn new_message_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("msg_{}", &raw[..16])
}

enum StepEnd {
    Finished {
        parts: Vec<MessagePart>,
        called_tools: bool,
    },
    Failed(LlmError),
    Abandoned,
}

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

fn flush_text(buffer: &mut String, parts: &mut Vec<MessagePart>) {
    if !buffer.is_empty() {
        parts.push(MessagePart::text(std::mem::take(buffer)));
    }
}

pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    executor: Arc<ToolExecutor>,
    system_prompt: String,
    max_steps: usize,
    request_timeout: Duration,
    stream_timeout: Duration,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            provider,
            executor,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_steps: 5,
            request_timeout: Duration::from_secs(60),
            stream_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// request: 建立流的超时；stream: 两个增量之间的最长间隔
    pub fn with_timeouts(mut self, request: Duration, stream: Duration) -> Self {
        self.request_timeout = request;
        self.stream_timeout = stream;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// 后端累计 token 用量 (prompt, completion)
    pub fn token_usage(&self) -> (u64, u64) {
        self.provider.token_usage()
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// 驱动一次完整生成，把事件写入 tx，返回终止状态
    pub async fn run(
        &self,
        request: ChatRequest,
        ctx: RunContext,
        tx: mpsc::Sender<StreamEvent>,
    ) -> RunOutcome {
        let mut outcome = RunOutcome {
            phase: RunPhase::Abandoned,
            steps: 0,
            tool_calls: 0,
        };
        tracing::info!(
            request_id = %ctx.request_id,
            message_id = %ctx.message_id,
            model = %self.provider.model(),
            messages = request.messages.len(),
            "Generation started"
        );

        let start = StreamEvent::Start {
            message_id: ctx.message_id.clone(),
            request_id: ctx.request_id.clone(),
        };
        if !send(&tx, start).await {
            return outcome;
        }

        let tools = self.executor.specs();
        let mut messages = request.messages;
        let mut finish = FinishReason::MaxSteps;

        while outcome.steps < self.max_steps {
            outcome.steps += 1;
            let completion = CompletionRequest {
                system: self.system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
            };
            match self.run_step(&completion, &tx, &mut outcome.tool_calls).await {
                StepEnd::Finished {
                    parts,
                    called_tools: true,
                } => {
                    messages.push(ChatMessage::new(Role::Assistant, parts));
                }
                StepEnd::Finished { .. } => {
                    finish = FinishReason::Stop;
                    break;
                }
                StepEnd::Failed(err) => {
                    let err = AppError::from(err);
                    tracing::error!(request_id = %ctx.request_id, step = outcome.steps, error = %err, "Generation failed");
                    send(
                        &tx,
                        StreamEvent::Error {
                            error_text: UPSTREAM_ERROR_TEXT.to_string(),
                        },
                    )
                    .await;
                    outcome.phase = RunPhase::Failed;
                    return outcome;
                }
                StepEnd::Abandoned => {
                    tracing::info!(request_id = %ctx.request_id, step = outcome.steps, "Client disconnected, generation abandoned");
                    return outcome;
                }
            }
        }

        if finish == FinishReason::MaxSteps {
            tracing::warn!(request_id = %ctx.request_id, max_steps = self.max_steps, "Step limit reached");
        }
        if send(&tx, StreamEvent::Done { finish_reason: finish }).await {
            outcome.phase = RunPhase::Done;
        }
        let (prompt_tokens, completion_tokens) = self.provider.token_usage();
        tracing::info!(
            request_id = %ctx.request_id,
            steps = outcome.steps,
            tool_calls = outcome.tool_calls,
            prompt_tokens,
            completion_tokens,
            "Generation finished"
        );
        outcome
    }

    /// 一轮模型调用：转发文本增量，遇到工具调用就地执行并回传结果
    async fn run_step(
        &self,
        request: &CompletionRequest,
        tx: &mpsc::Sender<StreamEvent>,
        tool_calls: &mut usize,
    ) -> StepEnd {
        let opened = tokio::select! {
            biased;
            _ = tx.closed() => return StepEnd::Abandoned,
            r = timeout(self.request_timeout, self.provider.stream(request)) => r,
        };
        let mut stream = match opened {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return StepEnd::Failed(e),
            Err(_) => return StepEnd::Failed(LlmError::Timeout(self.request_timeout.as_secs())),
        };

        let mut parts = Vec::new();
        let mut text = String::new();
        let mut called_tools = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => return StepEnd::Abandoned,
                n = timeout(self.stream_timeout, stream.next()) => n,
            };
            let chunk = match next {
                Err(_) => return StepEnd::Failed(LlmError::Timeout(self.stream_timeout.as_secs())),
                Ok(None) => break,
                Ok(Some(Err(e))) => return StepEnd::Failed(e),
                Ok(Some(Ok(chunk))) => chunk,
            };

            match chunk {
                CompletionChunk::TextDelta(delta) => {
                    if delta.is_empty() {
                        continue;
                    }
                    text.push_str(&delta);
                    if !send(tx, StreamEvent::Text { text: delta }).await {
                        return StepEnd::Abandoned;
                    }
                }
                CompletionChunk::ToolCall(call) => {
                    flush_text(&mut text, &mut parts);
                    let announced = send(
                        tx,
                        StreamEvent::ToolCall {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            args: call.args.clone(),
                        },
                    )
                    .await;
                    if !announced {
                        return StepEnd::Abandoned;
                    }

                    let outcome = self.executor.invoke(&call.name, call.args.clone()).await;
                    *tool_calls += 1;
                    called_tools = true;
                    let succeeded = outcome.is_success();
                    let (result, error) = outcome.into_parts();

                    if tx.is_closed() {
                        tracing::info!(
                            tool = %call.name,
                            tool_call_id = %call.id,
                            ok = succeeded,
                            "Client gone before tool result was delivered, result dropped"
                        );
                        return StepEnd::Abandoned;
                    }
                    let delivered = send(
                        tx,
                        StreamEvent::ToolResult {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            result: result.clone(),
                            error: error.clone(),
                        },
                    )
                    .await;
                    if !delivered {
                        return StepEnd::Abandoned;
                    }

                    parts.push(MessagePart::ToolCall {
                        tool_call_id: Some(call.id.clone()),
                        tool_name: call.name.clone(),
                        args: call.args,
                    });
                    parts.push(MessagePart::ToolResult {
                        tool_call_id: Some(call.id),
                        tool_name: call.name,
                        result,
                        error,
                    });
                }
                CompletionChunk::Done => break,
            }
        }

        flush_text(&mut text, &mut parts);
        StepEnd::Finished {
            parts,
            called_tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::llm::{ScriptedProvider, ToolCallRequest};
    use crate::resources::{MemoryBackend, ResourceGateway};
    use crate::tools::build_registry;

    fn executor() -> Arc<ToolExecutor> {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        Arc::new(ToolExecutor::new(build_registry(gw), 5))
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> CompletionChunk {
        CompletionChunk::ToolCall(ToolCallRequest {
            id: id.into(),
            name: name.into(),
            args,
        })
    }

    fn request(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user(text)],
        }
    }

    async fn drive(orch: &Orchestrator, text: &str) -> (RunOutcome, Vec<StreamEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = orch.run(request(text), RunContext::new("req_test"), tx).await;
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        (outcome, events)
    }

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::kind).collect()
    }

    #[tokio::test]
    async fn test_tool_result_follows_call_then_text() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .push_step(vec![
                    CompletionChunk::TextDelta("Creating it.".into()),
                    call("call_1", "createBoard", json!({"name": "Test Board"})),
                    CompletionChunk::Done,
                ])
                .push_step(vec![
                    CompletionChunk::TextDelta("Board created.".into()),
                    CompletionChunk::Done,
                ]),
        );
        let orch = Orchestrator::new(provider.clone(), executor());
        let (outcome, events) = drive(&orch, "Create a board named Test Board").await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert_eq!(outcome.tool_calls, 1);
        assert_eq!(
            kinds(&events),
            vec!["start", "text", "tool-call", "tool-result", "text", "done"]
        );
        match &events[3] {
            StreamEvent::ToolResult {
                tool_call_id,
                result,
                error,
                ..
            } => {
                assert_eq!(tool_call_id, "call_1");
                assert_eq!(result.as_ref().unwrap()["board"]["name"], "Test Board");
                assert!(error.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }

        // 第二轮上下文带上了工具调用与结果
        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(matches!(last.parts[0], MessagePart::Text { .. }));
        assert!(matches!(last.parts[1], MessagePart::ToolCall { .. }));
        assert!(matches!(last.parts[2], MessagePart::ToolResult { .. }));
        assert!(!second.tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_failures_are_stream_data() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .push_step(vec![
                    call("call_1", "noSuchTool", json!({})),
                    call("call_2", "getBoard", json!({"boardId": "bad"})),
                    CompletionChunk::Done,
                ])
                .push_step(vec![CompletionChunk::TextDelta("Sorry.".into())]),
        );
        let orch = Orchestrator::new(provider, executor());
        let (outcome, events) = drive(&orch, "hi").await;

        assert_eq!(outcome.phase, RunPhase::Done);
        assert_eq!(
            kinds(&events),
            vec!["start", "tool-call", "tool-result", "tool-call", "tool-result", "text", "done"]
        );
        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolResult { error: Some(err), .. } => Some(err["error"].clone()),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![json!("UnknownTool"), json!("InvalidInput")]);
    }

    #[tokio::test]
    async fn test_step_cap_ends_with_max_steps() {
        let looping = || vec![call("c", "listBoards", json!({})), CompletionChunk::Done];
        let provider = Arc::new(
            ScriptedProvider::new()
                .push_step(looping())
                .push_step(looping())
                .push_step(looping()),
        );
        let orch = Orchestrator::new(provider.clone(), executor()).with_max_steps(2);
        let (outcome, events) = drive(&orch, "loop").await;

        assert_eq!(outcome.steps, 2);
        assert_eq!(provider.requests().len(), 2);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Done {
                finish_reason: FinishReason::MaxSteps
            })
        );
    }

    #[tokio::test]
    async fn test_upstream_error_keeps_partial_output() {
        let provider = Arc::new(ScriptedProvider::new().push_items(vec![
            Ok(CompletionChunk::TextDelta("Partial".into())),
            Err(LlmError::Stream("connection reset".into())),
        ]));
        let orch = Orchestrator::new(provider, executor());
        let (outcome, events) = drive(&orch, "hi").await;

        assert_eq!(outcome.phase, RunPhase::Failed);
        assert_eq!(kinds(&events), vec!["start", "text", "error"]);
        match &events[2] {
            StreamEvent::Error { error_text } => assert!(!error_text.contains("connection reset")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_refusal_fails_without_retry() {
        let provider = Arc::new(ScriptedProvider::new().push_failure(LlmError::Request("HTTP 503".into())));
        let orch = Orchestrator::new(provider.clone(), executor());
        let (outcome, events) = drive(&orch, "hi").await;
        assert_eq!(outcome.phase, RunPhase::Failed);
        assert_eq!(kinds(&events), vec!["start", "error"]);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_times_out() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_delay(Duration::from_secs(10))
                .push_step(vec![CompletionChunk::TextDelta("late".into())]),
        );
        let orch = Orchestrator::new(provider, executor())
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(2));
        let (outcome, events) = drive(&orch, "hi").await;
        assert_eq!(outcome.phase, RunPhase::Failed);
        assert_eq!(kinds(&events), vec!["start", "error"]);
    }

    #[tokio::test]
    async fn test_disconnect_abandons_generation() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_delay(Duration::from_millis(20))
                .push_step(
                    (0..50)
                        .map(|i| CompletionChunk::TextDelta(format!("w{i} ")))
                        .collect(),
                ),
        );
        let orch = Arc::new(Orchestrator::new(provider, executor()));
        let (tx, mut rx) = mpsc::channel(4);
        let runner = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run(request("hi"), RunContext::new("req_x"), tx).await })
        };

        assert_eq!(rx.recv().await.map(|e| e.kind()), Some("start"));
        drop(rx);
        let outcome = runner.await.unwrap();
        assert_eq!(outcome.phase, RunPhase::Abandoned);
    }

    #[test]
    fn test_message_id_shape() {
        let id = new_message_id();
        assert!(id.starts_with("msg_"));
        assert_eq!(id.len(), 20);
        assert!(id[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
