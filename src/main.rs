//! BoardBee 服务入口
//!
//! 启动: cargo run -- [config.toml]，默认监听 0.0.0.0:3000（环境变量 PORT 可覆盖）

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use boardbee::config::load_config;
use boardbee::core::ShutdownManager;
use boardbee::rate_limit::spawn_cleanup;
use boardbee::web::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    boardbee::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let addr = format!("{}:{}", config.server.host, config.port());
    let cleanup_interval = Duration::from_secs(config.rate_limit.cleanup_interval_secs.max(1));

    let state = Arc::new(AppState::from_config(config));
    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let cleanup = spawn_cleanup(state.limiter.clone(), cleanup_interval, shutdown.token());

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("BoardBee listening on http://{}", addr);

    let signal = Arc::clone(&shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.wait_for_shutdown().await })
        .await
        .context("Server error")?;

    let _ = cleanup.await;
    let reason = shutdown.reason().map(|r| r.as_str()).unwrap_or("server exited");
    tracing::info!(reason, "BoardBee stopped");
    Ok(())
}
