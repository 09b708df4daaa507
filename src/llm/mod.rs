//! LLM 层：补全后端抽象与实现（OpenAI 兼容 / Mock / 脚本回放）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::{MockProvider, ScriptedProvider};
pub use openai::{OpenAiProvider, TokenUsage};
pub use traits::{
    CompletionChunk, CompletionProvider, CompletionRequest, CompletionStream, LlmError,
    ToolCallRequest, ToolSpec,
};

use crate::config::LlmSection;

/// 按配置创建补全后端；openai 缺少 API Key 时回落到 mock 并告警
pub fn create_provider(cfg: &LlmSection) -> Arc<dyn CompletionProvider> {
    if cfg.provider.eq_ignore_ascii_case("openai") {
        let key = std::env::var(&cfg.api_key_env).unwrap_or_default();
        match OpenAiProvider::new(cfg.base_url.as_deref(), &cfg.model, &key, cfg.temperature) {
            Ok(p) => {
                tracing::info!(model = %cfg.model, "Using OpenAI-compatible provider");
                return Arc::new(p);
            }
            Err(e) => {
                tracing::warn!(error = %e, env = %cfg.api_key_env, "OpenAI provider unavailable, falling back to mock");
            }
        }
    } else if !cfg.provider.eq_ignore_ascii_case("mock") {
        tracing::warn!(provider = %cfg.provider, "Unknown llm provider, using mock");
    }
    Arc::new(MockProvider::new(&cfg.model))
}
