//! Switchboard - 多集成智能体中枢
//!
//! 一句自然语言指令 → 意图分类 → 并发调用各集成子智能体 → 聚合部分失败 → 全程审计。
//!
//! 模块划分：
//! - **agents**: 邮件 / 日历 / 聊天 / 工单子智能体与注册表
//! - **audit**: 只追加的审计日志（JSON Lines / 内存）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 数据模型、错误、意图分类、重试、编排器、装配与关闭
//! - **gateway**: axum HTTP 入口（feature = "server"）
//! - **integrations**: 动作执行器、凭据提供方、分发器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与嵌入
//! - **memory**: 语义记忆（词重叠 / 向量）
//! - **observability**: tracing 初始化

pub mod agents;
pub mod audit;
pub mod config;
pub mod core;
#[cfg(feature = "server")]
pub mod gateway;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;

pub use crate::core::{AggregatedResponse, Hub, HubBuilder, Orchestrator, OverallStatus};
