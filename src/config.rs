//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BOARDBEE__*` 覆盖（双下划线表示嵌套，如 `BOARDBEE__LLM__PROVIDER=openai`）。
//! 所有字段都有默认值，空配置即可启动（mock 模型 + 内存后端）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSection,
    pub llm: LlmSection,
    pub rate_limit: RateLimitSection,
    pub tools: ToolsSection,
    pub backend: BackendSection,
    pub cache: CacheSection,
}

/// [server] 段：监听地址、请求体上限、SSE keep-alive 间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    pub keep_alive_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit_bytes: 1024 * 1024,
            keep_alive_secs: 15,
        }
    }
}

/// [llm] 段：模型后端选择、步数上限与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 但未配置 API Key 时回落到 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    pub api_key_env: String,
    pub temperature: f32,
    /// 单次请求内最多与模型往返的轮数（每轮可能触发若干工具调用）
    pub max_steps: usize,
    pub system_prompt: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            max_steps: 5,
            system_prompt: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// request：建立连接到首字节；stream：两个增量之间允许的最长静默
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: 60,
            stream: 30,
        }
    }
}

/// [rate_limit] 段：固定窗口限流
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// 每个 (客户端, 路由) 在一个窗口内允许的请求数
    pub max_requests: u32,
    pub window_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_secs: 60,
            cleanup_interval_secs: 300,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// [backend] 段：资源后端（memory / trello）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub kind: String,
    pub base_url: String,
    pub api_key_env: String,
    pub api_token_env: String,
    pub timeout_secs: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            base_url: "https://api.trello.com/1".to_string(),
            api_key_env: "TRELLO_API_KEY".to_string(),
            api_token_env: "TRELLO_API_TOKEN".to_string(),
            timeout_secs: 15,
        }
    }
}

/// [cache] 段：网关读缓存；ttl_secs 或 max_entries 为 0 时关闭
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 100,
        }
    }
}

impl AppConfig {
    /// 监听端口：环境变量 PORT 优先
    pub fn port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(self.server.port)
    }
}

/// 从 config 目录加载配置，环境变量 BOARDBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BOARDBEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BOARDBEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
