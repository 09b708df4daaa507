//! 按 (客户端, 路由) 的固定窗口限流
//!
//! 检查与计数在同一个临界区内完成，锁从不跨越 `.await`。过期窗口由后台任务定期清理。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// 准入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed {
        limit: u32,
        remaining: u32,
        /// 当前窗口还剩多少秒重置
        reset_after_secs: u64,
    },
    Rejected {
        limit: u32,
        /// 始终 >= 1
        retry_after_secs: u64,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStats {
    pub tracked_keys: usize,
    pub max_requests: u32,
    pub window_secs: u64,
}

pub trait RateLimiter: Send + Sync {
    fn admit(&self, client: &str, route: &str) -> Admission;

    fn reset(&self);

    /// 清理已过期的窗口，返回清理数量
    fn purge_expired(&self) -> usize;

    fn stats(&self) -> LimiterStats;
}

struct Window {
    count: u32,
    reset_at: Instant,
}

/// 固定窗口计数器
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<(String, String), Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, String), Window>> {
        // 计数表在 panic 后仍然一致：每次修改都是单个字段赋值
        self.windows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 向上取整到秒，至少 1
fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

impl RateLimiter for FixedWindowLimiter {
    fn admit(&self, client: &str, route: &str) -> Admission {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows
            .entry((client.to_string(), route.to_string()))
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + self.window,
            });
        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        let left = window.reset_at.saturating_duration_since(now);
        if window.count >= self.max_requests {
            return Admission::Rejected {
                limit: self.max_requests,
                retry_after_secs: ceil_secs(left),
            };
        }
        window.count += 1;
        Admission::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests - window.count,
            reset_after_secs: ceil_secs(left),
        }
    }

    fn reset(&self) {
        self.lock().clear();
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        before - windows.len()
    }

    fn stats(&self) -> LimiterStats {
        LimiterStats {
            tracked_keys: self.lock().len(),
            max_requests: self.max_requests,
            window_secs: self.window.as_secs(),
        }
    }
}

/// 后台定期清理过期窗口，直到 token 被取消
pub fn spawn_cleanup(
    limiter: Arc<dyn RateLimiter>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = limiter.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired rate-limit windows");
                    }
                }
            }
        }
    })
}
