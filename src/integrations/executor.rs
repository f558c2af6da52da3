//! 动作执行器：对某个集成执行一次外部操作
//!
//! 所有集成实现 ActionExecutor（kind / execute），由 ExecutorRegistry 按集成注册与查找。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::error::ErrorKind;
use crate::core::types::{IntegrationId, Parameters};
use crate::integrations::Token;

/// 执行器返回的类型化失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("credentials rejected: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Other(String),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::Unauthorized(_) => ErrorKind::AuthExpired,
            ExecutorError::RateLimited(_) => ErrorKind::RateLimited,
            ExecutorError::NotFound(_) => ErrorKind::NotFound,
            ExecutorError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ExecutorError::Unavailable(_) => ErrorKind::ProviderUnavailable,
            ExecutorError::Other(_) => ErrorKind::Unknown,
        }
    }
}

/// 执行器 trait：对单个集成执行一次操作，返回结构化载荷
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// 执行器类型（http / simulated），用于状态展示
    fn kind(&self) -> &'static str;

    async fn execute(
        &self,
        operation: &str,
        parameters: &Parameters,
        token: &Token,
    ) -> Result<Parameters, ExecutorError>;
}

/// 执行器注册表：每个集成至多一个执行器
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<IntegrationId, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: IntegrationId, executor: impl ActionExecutor + 'static) {
        self.executors.insert(id, Arc::new(executor));
    }

    pub fn register_arc(&mut self, id: IntegrationId, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(id, executor);
    }

    pub fn get(&self, id: IntegrationId) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(&id).cloned()
    }

    /// (集成, 执行器类型) 列表，按集成固定顺序
    pub fn describe(&self) -> Vec<(IntegrationId, &'static str)> {
        IntegrationId::ALL
            .into_iter()
            .filter_map(|id| self.executors.get(&id).map(|e| (id, e.kind())))
            .collect()
    }
}
