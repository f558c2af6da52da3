//! 集成测试共用的假实现：可编排的执行器、可注入失败的审计日志

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchboard::audit::{AuditLog, InMemoryAuditLog};
use switchboard::config::AppConfig;
use switchboard::core::{AuditEntry, AuditError, Hub, HubBuilder, IntegrationId, Parameters};
use switchboard::integrations::{ActionExecutor, ExecutorError, ExecutorRegistry, StaticCredentials, Token};
use switchboard::llm::MockLlmClient;

/// 按顺序返回预置结果的执行器；预置耗尽后返回成功
pub struct Scripted {
    replies: Mutex<VecDeque<Result<Parameters, ExecutorError>>>,
    delay: Duration,
    calls: AtomicUsize,
    operations: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn ok() -> Arc<Self> {
        Self::with(Vec::new())
    }

    pub fn with(replies: Vec<Result<Parameters, ExecutorError>>) -> Arc<Self> {
        Self::slow(replies, Duration::ZERO)
    }

    pub fn slow(replies: Vec<Result<Parameters, ExecutorError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            delay,
            calls: AtomicUsize::new(0),
            operations: Mutex::new(Vec::new()),
        })
    }

    /// 始终返回同一错误
    pub fn always(err: ExecutorError) -> Arc<Self> {
        Self::with(vec![Err(err); 8])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActionExecutor for Scripted {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn execute(
        &self,
        operation: &str,
        _parameters: &Parameters,
        _token: &Token,
    ) -> Result<Parameters, ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.operations.lock().unwrap().push(operation.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            let mut payload = Parameters::new();
            payload.insert("ok".into(), true.into());
            Ok(payload)
        })
    }
}

/// 前 ok_count 次写入成功，之后全部失败
pub struct FailingAudit {
    pub inner: InMemoryAuditLog,
    ok_count: usize,
    attempts: AtomicUsize,
}

impl FailingAudit {
    pub fn after(ok_count: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryAuditLog::new(),
            ok_count,
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditLog for FailingAudit {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) >= self.ok_count {
            return Err(AuditError::WriteFailed("disk full".into()));
        }
        self.inner.append(entry).await
    }
}

pub struct Executors {
    pub mail: Arc<Scripted>,
    pub calendar: Arc<Scripted>,
    pub chat: Arc<Scripted>,
    pub issue_tracker: Arc<Scripted>,
}

impl Default for Executors {
    fn default() -> Self {
        Self {
            mail: Scripted::ok(),
            calendar: Scripted::ok(),
            chat: Scripted::ok(),
            issue_tracker: Scripted::ok(),
        }
    }
}

impl Executors {
    fn registry(&self) -> ExecutorRegistry {
        let mut registry = ExecutorRegistry::new();
        registry.register_arc(IntegrationId::Mail, self.mail.clone());
        registry.register_arc(IntegrationId::Calendar, self.calendar.clone());
        registry.register_arc(IntegrationId::Chat, self.chat.clone());
        registry.register_arc(IntegrationId::IssueTracker, self.issue_tracker.clone());
        registry
    }
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.audit.backend = "memory".into();
    cfg.orchestrator.retry.base_delay_ms = 1;
    // 预置的 Mock 回复只留给分类器
    cfg.llm.compose = false;
    cfg
}

fn credentials() -> StaticCredentials {
    IntegrationId::ALL
        .into_iter()
        .fold(StaticCredentials::new(), |c, id| c.with_token(id, "test-token"))
}

pub async fn build_hub(
    executors: &Executors,
    audit: Arc<dyn AuditLog>,
    llm: MockLlmClient,
) -> Hub {
    build_hub_with(test_config(), executors, audit, Arc::new(llm)).await
}

pub async fn build_hub_with(
    config: AppConfig,
    executors: &Executors,
    audit: Arc<dyn AuditLog>,
    llm: Arc<MockLlmClient>,
) -> Hub {
    HubBuilder::new(config)
        .with_llm(llm)
        .with_executors(executors.registry())
        .with_credentials(Arc::new(credentials()))
        .with_audit(audit)
        .build()
        .await
        .unwrap()
}
