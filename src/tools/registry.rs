//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! ToolExecutor 在调用时加超时、写审计日志，并把失败转换为 tool-result 错误负载。

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::AppError;
use crate::llm::ToolSpec;
use crate::resources::ResourceGateway;
use crate::tools::schema::schema_value;

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型调用时使用的 toolName）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；参数不合法返回 InvalidInput，且不会触达后端
    async fn execute(&self, args: Value) -> Result<Value, AppError>;
}

pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send>>;

/// 以强类型参数实现的工具：参数由 serde 校验，schema 由 schemars 从同一类型导出
pub struct TypedTool<A> {
    name: &'static str,
    description: &'static str,
    gateway: Arc<ResourceGateway>,
    handler: fn(Arc<ResourceGateway>, A) -> ToolFuture,
    _args: PhantomData<fn() -> A>,
}

impl<A> TypedTool<A>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
{
    pub fn new(
        name: &'static str,
        description: &'static str,
        gateway: Arc<ResourceGateway>,
        handler: fn(Arc<ResourceGateway>, A) -> ToolFuture,
    ) -> Self {
        Self {
            name,
            description,
            gateway,
            handler,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<A> Tool for TypedTool<A>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<A>()
    }

    async fn execute(&self, args: Value) -> Result<Value, AppError> {
        let args = if args.is_null() {
            Value::Object(Map::new())
        } else {
            args
        };
        let parsed: A = serde_json::from_value(args)
            .map_err(|e| AppError::invalid(format!("Invalid arguments for {}: {e}", self.name)))?;
        (self.handler)(self.gateway.clone(), parsed).await
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, AppError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AppError::UnknownTool(name.to_string()))?;
        tool.execute(args).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名称排序
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 提供给模型的工具描述，按名称排序保证每次请求一致
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tool_names()
            .into_iter()
            .filter_map(|name| {
                self.tools.get(&name).map(|tool| ToolSpec {
                    description: tool.description().to_string(),
                    parameters: tool.parameters_schema(),
                    name,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    use crate::resources::MemoryBackend;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    fn echo(_: Arc<ResourceGateway>, args: EchoArgs) -> ToolFuture {
        Box::pin(async move { Ok(json!({"success": true, "text": args.text})) })
    }

    fn registry() -> ToolRegistry {
        let gw = Arc::new(ResourceGateway::new(Arc::new(MemoryBackend::new())));
        let mut r = ToolRegistry::new();
        r.register(TypedTool::new("echo", "Echo text back", gw, echo));
        r
    }

    #[tokio::test]
    async fn test_typed_tool_validates_arguments() {
        let r = registry();
        let out = r.execute("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out["text"], "hi");

        let err = r.execute("echo", json!({"text": 3})).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(m) if m.contains("echo")));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = registry().execute("nope", json!({})).await.unwrap_err();
        assert_eq!(err, AppError::UnknownTool("nope".into()));
    }

    #[test]
    fn test_specs_carry_schema() {
        let specs = registry().specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[0].parameters["type"], "object");
        assert!(specs[0].parameters["properties"].get("text").is_some());
    }
}
