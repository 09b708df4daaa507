//! 对话：消息模型、流事件、生成编排与 SSE 编码

pub mod encoder;
pub mod events;
pub mod message;
pub mod orchestrator;

pub use encoder::{event_stream, sse_response, DONE_SENTINEL};
pub use events::{FinishReason, StreamEvent};
pub use message::{ChatMessage, ChatRequest, MessagePart, Role};
pub use orchestrator::{Orchestrator, RunContext, RunOutcome, RunPhase, DEFAULT_SYSTEM_PROMPT};
