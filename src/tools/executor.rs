//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时。execute 在超时内调用 registry.execute，超时转为 ToolExecution 错误；
//! 每次调用输出结构化审计日志（JSON）。invoke 在此基础上把任何失败折叠为错误负载，供对话流作为数据回传。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::AppError;
use crate::llm::ToolSpec;
use crate::observability::Monitor;
use crate::tools::ToolRegistry;

/// 一次工具调用的结果：成功负载或错误负载，二者都是数据
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Failure(Value),
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success(_))
    }

    /// 拆成 tool-result 的 (result, error)
    pub fn into_parts(self) -> (Option<Value>, Option<Value>) {
        match self {
            ToolOutcome::Success(v) => (Some(v), None),
            ToolOutcome::Failure(v) => (None, Some(v)),
        }
    }
}

/// 工具失败 → `{success: false, error, message}`
pub fn error_payload(err: &AppError) -> Value {
    let code = match err {
        AppError::InvalidInput(_) => "InvalidInput",
        AppError::NotFound(_) => "NotFound",
        AppError::UnknownTool(_) => "UnknownTool",
        AppError::Upstream(_) => "UpstreamProviderError",
        _ => "ToolExecutionError",
    };
    let message = match err {
        AppError::ToolExecution { tool, reason } => format!("{tool} failed: {reason}"),
        other => other.client_message(),
    };
    json!({"success": false, "error": code, "message": message})
}

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    monitor: Option<Arc<Monitor>>,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// 执行指定工具；超时返回 ToolExecution，其余错误原样返回；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, AppError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let elapsed = start.elapsed();
        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": elapsed.as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        if let Some(monitor) = &self.monitor {
            let registered = self.registry.get(tool_name).is_some();
            monitor.record_tool_call(tool_name, registered, elapsed, ok);
        }

        match result {
            Ok(r) => r,
            Err(_) => Err(AppError::ToolExecution {
                tool: tool_name.to_string(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            }),
        }
    }

    /// 执行并把失败折叠为错误负载；从不返回 Err
    pub async fn invoke(&self, tool_name: &str, args: Value) -> ToolOutcome {
        match self.execute(tool_name, args).await {
            Ok(v) => ToolOutcome::Success(v),
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "Tool call failed");
                ToolOutcome::Failure(error_payload(&e))
            }
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::observability::UNKNOWN_TOOL;
    use crate::tools::Tool;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<Value, AppError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({"success": true}))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fails"
        }
        fn description(&self) -> &str {
            "always not found"
        }
        async fn execute(&self, _args: Value) -> Result<Value, AppError> {
            Err(AppError::not_found("The requested board does not exist"))
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut r = ToolRegistry::new();
        r.register(SlowTool);
        r.register(FailingTool);
        ToolExecutor::new(r, timeout_secs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failure_payload() {
        let exec = executor(1);
        let outcome = exec.invoke("slow", json!({})).await;
        let (result, error) = outcome.into_parts();
        assert!(result.is_none());
        let error = error.unwrap();
        assert_eq!(error["success"], false);
        assert_eq!(error["error"], "ToolExecutionError");
        assert!(error["message"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unknown_and_failing_tools_are_data() {
        let monitor = Arc::new(Monitor::new());
        let exec = executor(5).with_monitor(monitor.clone());

        let unknown = exec.invoke("missing", json!({})).await;
        assert_eq!(
            unknown,
            ToolOutcome::Failure(json!({
                "success": false,
                "error": "UnknownTool",
                "message": "Tool 'missing' is not registered"
            }))
        );

        let failed = exec.invoke("fails", json!({})).await;
        assert!(!failed.is_success());
        let (_, error) = failed.into_parts();
        assert_eq!(error.unwrap()["error"], "NotFound");

        let stats = monitor.snapshot().tool_call_stats;
        assert_eq!(stats["fails"].count, 1);
        assert!(!stats.contains_key("missing"));
        assert_eq!(stats[UNKNOWN_TOOL].success_rate, 0.0);
    }
}
