//! BoardBee - 看板智能体服务
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与优雅关闭
//! - **observability**: tracing 初始化与请求/工具统计
//! - **validation**: 请求体校验（chat / 表单 / 资源）
//! - **rate_limit**: 按 (客户端, 路由) 的固定窗口限流
//! - **chat**: 消息模型、流事件、生成编排与 SSE 编码
//! - **llm**: 模型提供方抽象与实现（OpenAI 兼容 / Mock）
//! - **tools**: Trello 风格工具目录与执行器
//! - **resources**: 资源网关与后端（内存 / Trello REST）
//! - **forms**: UI 表单描述生成
//! - **web**: axum 路由、中间件与错误信封

pub mod chat;
pub mod config;
pub mod core;
pub mod forms;
pub mod llm;
pub mod observability;
pub mod rate_limit;
pub mod resources;
pub mod tools;
pub mod validation;
pub mod web;
