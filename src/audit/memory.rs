//! 内存审计日志：测试与本地调试使用

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::audit::{trace_entry, AuditLog};
use crate::core::error::AuditError;
use crate::core::types::{AuditEntry, InstructionId};

#[derive(Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn entries_for(&self, instruction_id: InstructionId) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.instruction_id == instruction_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        trace_entry(&entry);
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
        Ok(())
    }
}
