//! 优雅关闭
//!
//! 收到 Ctrl+C / SIGTERM 后：停止接收新指令 → 等待后台指令任务完成（它们的动作仍需审计）→
//! 依次执行清理任务（审计日志落盘）。等待与清理各自受超时约束。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::audit::AuditLog;

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

/// 关闭信号：一个全局取消令牌
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 子令牌：随关闭一起取消，也可单独取消
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        if !self.token.is_cancelled() {
            tracing::info!(?reason, "shutdown requested");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 审计日志落盘
pub struct AuditLogCleanup {
    audit: Arc<dyn AuditLog>,
}

impl AuditLogCleanup {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self { audit }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for AuditLogCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.audit.sync().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "AuditLog"
    }
}

/// 关闭协调器：先等后台指令任务，再执行清理
pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    tasks: TaskTracker,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            tasks: TaskTracker::new(),
            cleanup_tasks: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 后台指令任务都通过这个 tracker 派生，关闭时逐一等待
    pub fn tracker(&self) -> TaskTracker {
        self.tasks.clone()
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub fn manager(&self) -> &Arc<ShutdownManager> {
        &self.manager
    }

    pub async fn run_cleanup(&self) {
        self.tasks.close();
        if !self.tasks.is_empty() {
            tracing::info!("Waiting for {} in-flight instruction(s)...", self.tasks.len());
        }
        if tokio::time::timeout(self.timeout, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                "{} instruction(s) still running after {:?}, their audit entries may be missing",
                self.tasks.len(),
                self.timeout
            );
        }

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!("Cleanup task '{}' completed", name),
                Ok(Err(e)) => tracing::warn!("Cleanup task '{}' failed: {}", name, e),
                Err(_) => tracing::warn!("Cleanup task '{}' timed out after {:?}", name, self.timeout),
            }
        }
    }
}
