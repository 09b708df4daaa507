//! OpenAI 兼容补全后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）：消息用类型化 builder 构造，
//! `create_stream` 返回的增量中 content 转为 TextDelta，tool_calls 按 index 累积，
//! 上游流正常结束（[DONE]）时整体发出并以 Done 收尾。没有 finish_reason 就断开视为流中断。

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionStreamResponse,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde_json::{json, Value};

use crate::chat::{ChatMessage, MessagePart, Role};
use crate::llm::traits::{
    CompletionChunk, CompletionProvider, CompletionRequest, CompletionStream, LlmError,
    ToolCallRequest, ToolSpec,
};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
        )
    }
}

fn build_err(e: impl Display) -> LlmError {
    LlmError::Request(format!("failed to build request: {e}"))
}

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    pub usage: TokenUsage,
}

impl OpenAiProvider {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, temperature: f32) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("API key is empty".to_string()));
        }
        let config = match base_url {
            Some(url) => OpenAIConfig::new()
                .with_api_base(url.trim_end_matches('/'))
                .with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Ok(Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature,
            usage: TokenUsage::default(),
        })
    }

    /// 组装流式请求；要求上游在结束前附带一帧 usage
    fn request(&self, request: &CompletionRequest) -> Result<CreateChatCompletionRequest, LlmError> {
        let mut built = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_openai_messages(&request.system, &request.messages)?)
            .temperature(self.temperature)
            .stream(true)
            .build()
            .map_err(build_err)?;
        built.stream_options = Some(serde_json::from_value(json!({"include_usage": true})).map_err(build_err)?);
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request.tools.iter().map(to_openai_tool).collect();
            built.tools = Some(serde_json::from_value(Value::Array(tools)).map_err(build_err)?);
        }
        Ok(built)
    }
}

fn system_message(content: String) -> Result<ChatCompletionRequestMessage, LlmError> {
    Ok(ChatCompletionRequestMessage::System(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(build_err)?,
    ))
}

/// ChatMessage → OpenAI messages
///
/// assistant 消息按 part 顺序切分：文本与 tool-call 合并为一条 assistant 消息，
/// 每个 tool-result 变成一条 role=tool 消息，紧随其调用之后。
pub fn to_openai_messages(
    system: &str,
    messages: &[ChatMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
    let mut out = Vec::new();
    if !system.is_empty() {
        out.push(system_message(system.to_string())?);
    }

    for (i, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::System => out.push(system_message(msg.text())?),
            Role::User => out.push(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(msg.text())
                    .build()
                    .map_err(build_err)?,
            )),
            Role::Assistant => {
                let mut turn = AssistantTurn::default();
                // 未带 id 的调用按工具名与结果配对
                let mut pending: Vec<(String, String)> = Vec::new();

                for (j, part) in msg.parts.iter().enumerate() {
                    match part {
                        MessagePart::Text { text } => turn.text.push_str(text),
                        MessagePart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                        } => {
                            let id = tool_call_id
                                .clone()
                                .unwrap_or_else(|| format!("call_{i}_{j}"));
                            pending.push((tool_name.clone(), id.clone()));
                            turn.calls.push(json!({
                                "id": id,
                                "type": "function",
                                "function": {"name": tool_name, "arguments": args.to_string()},
                            }));
                        }
                        MessagePart::ToolResult {
                            tool_call_id,
                            tool_name,
                            result,
                            error,
                        } => {
                            turn.flush(&mut out)?;
                            let id = match tool_call_id {
                                Some(id) => {
                                    pending.retain(|(_, p)| p != id);
                                    id.clone()
                                }
                                None => match pending.iter().position(|(n, _)| n == tool_name) {
                                    Some(pos) => pending.remove(pos).1,
                                    None => format!("call_{i}_{j}"),
                                },
                            };
                            let content = result
                                .as_ref()
                                .map(|r| r.to_string())
                                .or_else(|| error.as_ref().map(|e| json!({"error": e}).to_string()))
                                .unwrap_or_default();
                            out.push(ChatCompletionRequestMessage::Tool(
                                ChatCompletionRequestToolMessageArgs::default()
                                    .content(content)
                                    .tool_call_id(id)
                                    .build()
                                    .map_err(build_err)?,
                            ));
                        }
                    }
                }
                turn.flush(&mut out)?;
            }
        }
    }
    Ok(out)
}

/// 正在拼装的 assistant 消息
#[derive(Default)]
struct AssistantTurn {
    text: String,
    calls: Vec<Value>,
}

impl AssistantTurn {
    fn flush(&mut self, out: &mut Vec<ChatCompletionRequestMessage>) -> Result<(), LlmError> {
        if self.text.is_empty() && self.calls.is_empty() {
            return Ok(());
        }
        let mut msg = ChatCompletionRequestAssistantMessageArgs::default()
            .content(std::mem::take(&mut self.text))
            .build()
            .map_err(build_err)?;
        if !self.calls.is_empty() {
            let calls = Value::Array(std::mem::take(&mut self.calls));
            msg.tool_calls = Some(serde_json::from_value(calls).map_err(build_err)?);
        }
        out.push(ChatCompletionRequestMessage::Assistant(msg));
        Ok(())
    }
}

fn to_openai_tool(spec: &ToolSpec) -> Value {
    let mut parameters = spec.parameters.clone();
    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": parameters,
        }
    })
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// 增量转换状态：待发出的项 + 按 index 累积的工具调用
struct DeltaState<S> {
    upstream: S,
    pending: VecDeque<Result<CompletionChunk, LlmError>>,
    calls: BTreeMap<u32, PartialCall>,
    usage: TokenUsage,
    finish_seen: bool,
    ended: bool,
}

impl<S> DeltaState<S> {
    fn flush_calls(&mut self) {
        for (_, call) in std::mem::take(&mut self.calls) {
            let args = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.arguments).unwrap_or(Value::String(call.arguments))
            };
            self.pending.push_back(Ok(CompletionChunk::ToolCall(ToolCallRequest {
                id: call.id,
                name: call.name,
                args,
            })));
        }
    }

    fn absorb(&mut self, chunk: CreateChatCompletionStreamResponse) {
        if let Some(usage) = &chunk.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };
        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            self.pending.push_back(Ok(CompletionChunk::TextDelta(text)));
        }
        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let entry = self.calls.entry(tc.index).or_default();
            if let Some(id) = tc.id {
                entry.id = id;
            }
            if let Some(function) = tc.function {
                if let Some(name) = function.name {
                    entry.name.push_str(&name);
                }
                if let Some(args) = function.arguments {
                    entry.arguments.push_str(&args);
                }
            }
        }
        if choice.finish_reason.is_some() {
            // 之后可能还有一帧只带 usage 的增量，Done 留到上游结束再发
            self.flush_calls();
            self.finish_seen = true;
        }
    }
}

/// 把 async_openai 的增量流转换为补全增量流
fn adapt_stream<S, E>(upstream: S, usage: TokenUsage) -> CompletionStream
where
    S: Stream<Item = Result<CreateChatCompletionStreamResponse, E>> + Send + Unpin + 'static,
    E: Display,
{
    let state = DeltaState {
        upstream,
        pending: VecDeque::new(),
        calls: BTreeMap::new(),
        usage,
        finish_seen: false,
        ended: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.ended {
                return None;
            }
            match st.upstream.next().await {
                Some(Ok(chunk)) => st.absorb(chunk),
                Some(Err(e)) => {
                    st.ended = true;
                    st.pending.push_back(Err(LlmError::Stream(e.to_string())));
                }
                None => {
                    st.ended = true;
                    if st.finish_seen {
                        st.pending.push_back(Ok(CompletionChunk::Done));
                    } else {
                        st.pending.push_back(Err(LlmError::Stream(
                            "upstream closed before completion".to_string(),
                        )));
                    }
                }
            }
        }
    }))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        tracing::debug!(model = %self.model, messages = request.messages.len(), tools = request.tools.len(), "Sending completion request");
        let upstream = self
            .client
            .chat()
            .create_stream(self.request(request)?)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;
        Ok(adapt_stream(upstream, self.usage.clone()))
    }

    fn token_usage(&self) -> (u64, u64) {
        self.usage.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 按线上格式构造一帧增量
    fn frame(choices: Value) -> CreateChatCompletionStreamResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": choices,
        }))
        .unwrap()
    }

    fn usage_frame(prompt: u32, completion: u32) -> CreateChatCompletionStreamResponse {
        serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": [],
            "usage": {
                "prompt_tokens": prompt,
                "completion_tokens": completion,
                "total_tokens": prompt + completion
            }
        }))
        .unwrap()
    }

    fn text(content: &str) -> CreateChatCompletionStreamResponse {
        frame(json!([{"index": 0, "delta": {"content": content}}]))
    }

    fn finish(reason: &str) -> CreateChatCompletionStreamResponse {
        frame(json!([{"index": 0, "delta": {}, "finish_reason": reason}]))
    }

    fn adapt(frames: Vec<CreateChatCompletionStreamResponse>, usage: TokenUsage) -> CompletionStream {
        let items: Vec<Result<CreateChatCompletionStreamResponse, String>> =
            frames.into_iter().map(Ok).collect();
        adapt_stream(stream::iter(items), usage)
    }

    #[tokio::test]
    async fn test_text_deltas_and_done() {
        let s = adapt(vec![text("Hel"), text("lo"), finish("stop")], TokenUsage::default());
        let items: Vec<_> = s.collect().await;
        assert_eq!(
            items,
            vec![
                Ok(CompletionChunk::TextDelta("Hel".into())),
                Ok(CompletionChunk::TextDelta("lo".into())),
                Ok(CompletionChunk::Done)
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_arguments_accumulate_across_frames() {
        let s = adapt(
            vec![
                frame(json!([{"index": 0, "delta": {"tool_calls": [
                    {"index": 0, "id": "call_a", "type": "function",
                     "function": {"name": "createBoard", "arguments": "{\"na"}}
                ]}}])),
                frame(json!([{"index": 0, "delta": {"tool_calls": [
                    {"index": 0, "function": {"arguments": "me\":\"Q3\"}"}}
                ]}}])),
                finish("tool_calls"),
            ],
            TokenUsage::default(),
        );
        let items: Vec<_> = s.collect().await;
        assert_eq!(
            items,
            vec![
                Ok(CompletionChunk::ToolCall(ToolCallRequest {
                    id: "call_a".into(),
                    name: "createBoard".into(),
                    args: json!({"name": "Q3"}),
                })),
                Ok(CompletionChunk::Done)
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_stream_is_an_error() {
        let s = adapt(vec![text("The board was")], TokenUsage::default());
        let items: Vec<_> = s.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(CompletionChunk::TextDelta("The board was".into())));
        assert!(matches!(items[1], Err(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn test_usage_frame_after_finish_is_counted() {
        let usage = TokenUsage::default();
        let s = adapt(vec![text("ok"), finish("stop"), usage_frame(12, 3)], usage.clone());
        let items: Vec<_> = s.collect().await;
        assert_eq!(items.last(), Some(&Ok(CompletionChunk::Done)));
        assert_eq!(usage.get(), (12, 3));
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let items: Vec<Result<CreateChatCompletionStreamResponse, String>> =
            vec![Ok(text("a")), Err("connection reset".to_string()), Ok(text("b"))];
        let out: Vec<_> = adapt_stream(stream::iter(items), TokenUsage::default())
            .collect()
            .await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], Err(LlmError::Stream(m)) if m.contains("connection reset")));
    }

    #[test]
    fn test_messages_pair_tool_results_with_calls() {
        let msgs = vec![
            ChatMessage::user("make a board"),
            ChatMessage::new(
                Role::Assistant,
                vec![
                    MessagePart::text("ok"),
                    MessagePart::ToolCall {
                        tool_call_id: None,
                        tool_name: "createBoard".into(),
                        args: json!({"name": "A"}),
                    },
                    MessagePart::ToolResult {
                        tool_call_id: None,
                        tool_name: "createBoard".into(),
                        result: Some(json!({"success": true})),
                        error: None,
                    },
                ],
            ),
        ];
        let out = to_openai_messages("sys", &msgs).unwrap();
        let wire = serde_json::to_value(&out).unwrap();
        assert_eq!(wire.as_array().unwrap().len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["role"], "assistant");
        let call_id = wire[2]["tool_calls"][0]["id"].as_str().unwrap();
        assert_eq!(wire[2]["tool_calls"][0]["function"]["name"], "createBoard");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], call_id);
    }

    #[test]
    fn test_request_carries_tools_and_usage_option() {
        let provider = OpenAiProvider::new(None, "gpt-4o", "sk-test", 0.0).unwrap();
        let request = CompletionRequest {
            system: "sys".into(),
            messages: vec![ChatMessage::user("hi")],
            tools: vec![ToolSpec {
                name: "listBoards".into(),
                description: "List boards".into(),
                parameters: json!({"$schema": "x", "title": "Args", "type": "object", "properties": {}}),
            }],
        };
        let wire = serde_json::to_value(provider.request(&request).unwrap()).unwrap();
        assert_eq!(wire["stream"], true);
        assert_eq!(wire["stream_options"]["include_usage"], true);
        assert_eq!(wire["tools"][0]["function"]["name"], "listBoards");
        assert!(wire["tools"][0]["function"]["parameters"].get("$schema").is_none());
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(
            OpenAiProvider::new(None, "gpt-4o", " ", 0.0),
            Err(LlmError::Config(_))
        ));
    }
}
