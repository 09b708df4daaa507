//! 共享状态：编排器、资源网关、限流器、监控，按配置组装

use std::sync::Arc;
use std::time::Duration;

use crate::chat::Orchestrator;
use crate::config::AppConfig;
use crate::llm::{create_provider, CompletionProvider};
use crate::observability::Monitor;
use crate::rate_limit::{FixedWindowLimiter, RateLimiter};
use crate::resources::{MemoryBackend, ReadCache, ResourceBackend, ResourceGateway, TrelloBackend};
use crate::tools::{build_registry, ToolExecutor};

pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<ResourceGateway>,
    pub limiter: Arc<dyn RateLimiter>,
    pub monitor: Arc<Monitor>,
}

/// 按 [backend] 创建资源后端；trello 缺凭据时回落到内存后端并告警
pub fn create_backend(config: &AppConfig) -> Arc<dyn ResourceBackend> {
    let section = &config.backend;
    if section.kind.eq_ignore_ascii_case("trello") {
        match TrelloBackend::from_config(section) {
            Ok(b) => {
                tracing::info!(base_url = %section.base_url, "Using Trello backend");
                return Arc::new(b);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Trello backend unavailable, falling back to in-memory store");
            }
        }
    } else if !section.kind.eq_ignore_ascii_case("memory") {
        tracing::warn!(kind = %section.kind, "Unknown backend kind, using in-memory store");
    }
    Arc::new(MemoryBackend::new())
}

impl AppState {
    pub fn from_config(config: AppConfig) -> Self {
        let provider = create_provider(&config.llm);
        let backend = create_backend(&config);
        Self::with_components(config, provider, backend)
    }

    /// 显式注入模型与后端（测试使用脚本模型 + 内存后端）
    pub fn with_components(
        config: AppConfig,
        provider: Arc<dyn CompletionProvider>,
        backend: Arc<dyn ResourceBackend>,
    ) -> Self {
        let monitor = Arc::new(Monitor::new());
        let cache = ReadCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_entries,
        );
        let gateway = Arc::new(ResourceGateway::new(backend).with_cache(cache));
        let executor = ToolExecutor::new(build_registry(gateway.clone()), config.tools.tool_timeout_secs)
            .with_monitor(monitor.clone());

        let mut orchestrator = Orchestrator::new(provider, Arc::new(executor))
            .with_max_steps(config.llm.max_steps)
            .with_timeouts(
                Duration::from_secs(config.llm.timeouts.request),
                Duration::from_secs(config.llm.timeouts.stream),
            );
        if let Some(prompt) = config.llm.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            orchestrator = orchestrator.with_system_prompt(prompt);
        }

        let limiter = Arc::new(FixedWindowLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        ));

        tracing::info!(
            model = %orchestrator.model(),
            backend = %gateway.backend_name(),
            tools = orchestrator.executor().tool_names().len(),
            cache = gateway.cache_stats().enabled,
            "Application state ready"
        );

        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            gateway,
            limiter,
            monitor,
        }
    }
}
