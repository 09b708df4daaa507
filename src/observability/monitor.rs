//! 请求与工具调用统计
//!
//! 只在内存中累计，GET /api/metrics 只读导出；进程重启即清零。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

const MAX_RECENT_ERRORS: usize = 100;
/// 未注册工具统一计入的键，避免任意名字撑大统计表
pub const UNKNOWN_TOOL: &str = "unknown";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentError {
    pub timestamp: String,
    pub request_id: String,
    pub client: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub count: u64,
    pub average_duration_ms: f64,
    pub success_rate: f64,
}

/// /api/metrics 的响应体
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub tool_call_stats: HashMap<String, ToolStats>,
    pub recent_errors: Vec<RecentError>,
}

#[derive(Default)]
struct ToolTotals {
    count: u64,
    ok: u64,
    total_ms: u128,
}

#[derive(Default)]
struct Inner {
    total: u64,
    failed: u64,
    total_ms: u128,
    tools: HashMap<String, ToolTotals>,
    errors: VecDeque<RecentError>,
}

#[derive(Default)]
pub struct Monitor {
    inner: Mutex<Inner>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求结束时调用；status >= 400 计为失败
    pub fn record_request(&self, status: u16, elapsed: Duration) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.total += 1;
        inner.total_ms += elapsed.as_millis();
        if status >= 400 {
            inner.failed += 1;
        }
    }

    /// 记录一条错误（保留最近 100 条）
    pub fn record_error(&self, request_id: &str, client: &str, error: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.errors.push_back(RecentError {
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: request_id.to_string(),
            client: client.to_string(),
            error: error.to_string(),
        });
        while inner.errors.len() > MAX_RECENT_ERRORS {
            inner.errors.pop_front();
        }
    }

    /// registered 为 false 时计入 UNKNOWN_TOOL
    pub fn record_tool_call(&self, tool: &str, registered: bool, elapsed: Duration, ok: bool) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let key = if registered { tool } else { UNKNOWN_TOOL };
        let t = inner.tools.entry(key.to_string()).or_default();
        t.count += 1;
        t.total_ms += elapsed.as_millis();
        if ok {
            t.ok += 1;
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let Ok(inner) = self.inner.lock() else {
            return MonitorSnapshot::default();
        };
        let ratio = |num: u128, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        MonitorSnapshot {
            total_requests: inner.total,
            successful_requests: inner.total - inner.failed,
            failed_requests: inner.failed,
            average_response_time_ms: ratio(inner.total_ms, inner.total),
            error_rate: ratio(inner.failed as u128, inner.total),
            tool_call_stats: inner
                .tools
                .iter()
                .map(|(name, t)| {
                    (
                        name.clone(),
                        ToolStats {
                            count: t.count,
                            average_duration_ms: ratio(t.total_ms, t.count),
                            success_rate: ratio(t.ok as u128, t.count),
                        },
                    )
                })
                .collect(),
            recent_errors: inner.errors.iter().cloned().collect(),
        }
    }
}
