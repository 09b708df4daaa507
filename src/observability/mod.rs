//! 可观测性：tracing 初始化与进程内请求/工具统计

pub mod monitor;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use monitor::{Monitor, MonitorSnapshot, ToolStats, UNKNOWN_TOOL};

/// 安装全局 subscriber：RUST_LOG 优先，未设置时为 info
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
