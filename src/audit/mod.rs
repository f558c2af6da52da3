//! 审计日志：每个外部动作的请求/结果对，只追加
//!
//! 编排器是唯一写入方；append 返回前条目必须已持久化（先写后响应）。

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::core::error::AuditError;
use crate::core::types::AuditEntry;

pub use file::JsonlAuditLog;
pub use memory::InMemoryAuditLog;

/// 审计日志 trait：实现内部需串行化并发 append，条目不得丢失或部分写入
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// 将缓冲区落盘（关闭时调用）
    async fn sync(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// 同步镜像到 tracing（target = "audit"）；失败动作额外以 warn 输出
pub(crate) fn trace_entry(entry: &AuditEntry) {
    let line = serde_json::to_string(entry).unwrap_or_default();
    if entry.action_result.is_success() {
        tracing::info!(target: "audit", entry = %line, "audit");
    } else {
        tracing::warn!(target: "audit", entry = %line, "audit (failed action)");
    }
}
