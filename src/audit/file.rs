//! JSON Lines 审计日志
//!
//! 每条记录一行 JSON；append 在互斥锁内完成 write + flush + fsync，返回即已落盘。
//! 写入失败时把文件截回写入前的长度，不留半行；打开时丢弃上次崩溃留下的不完整尾行。

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::audit::{trace_entry, AuditLog};
use crate::core::error::AuditError;
use crate::core::types::AuditEntry;

pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    /// 打开（或创建）审计文件；父目录不存在时自动创建
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AuditError::WriteFailed(format!("{}: {e}", parent.display())))?;
            }
        }
        let dropped = repair_torn_tail(&path)
            .await
            .map_err(|e| AuditError::WriteFailed(format!("{}: {e}", path.display())))?;
        if dropped > 0 {
            tracing::warn!(
                path = %path.display(),
                bytes = dropped,
                "dropped incomplete trailing audit line"
            );
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AuditError::WriteFailed(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditLog for JsonlAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| AuditError::WriteFailed(format!("serialize: {e}")))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        let prev_len = file
            .metadata()
            .await
            .map_err(|e| AuditError::WriteFailed(e.to_string()))?
            .len();
        if let Err(e) = write_line(&mut file, &line).await {
            truncate_to(&mut file, prev_len).await;
            return Err(AuditError::WriteFailed(e.to_string()));
        }
        drop(file);

        trace_entry(&entry);
        Ok(())
    }

    async fn sync(&self) -> Result<(), AuditError> {
        let file = self.file.lock().await;
        file.sync_all()
            .await
            .map_err(|e| AuditError::WriteFailed(e.to_string()))
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await?;
    file.sync_data().await
}

/// 截回到 len，去掉写了一半的记录
async fn truncate_to(file: &mut File, len: u64) {
    let result = async {
        file.set_len(len).await?;
        file.sync_data().await
    }
    .await;
    if let Err(e) = result {
        tracing::error!(error = %e, len, "failed to roll back partial audit line");
    }
}

/// 文件末尾不是换行时截到最后一个完整行，返回丢弃的字节数
async fn repair_torn_tail(path: &Path) -> std::io::Result<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)
        .await?;
    let len = file.metadata().await?.len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1)).await?;
    file.read_exact(&mut last).await?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    file.seek(SeekFrom::Start(0)).await?;
    let mut content = Vec::with_capacity(len as usize);
    file.read_to_end(&mut content).await?;
    let keep = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i as u64 + 1);
    file.set_len(keep).await?;
    file.sync_all().await?;
    Ok(len - keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{
        ActionRequest, ActionResult, ActorIdentity, Dispatched, IntegrationId, InstructionId,
        Parameters,
    };
    use std::sync::Arc;

    fn entry(op: &str) -> AuditEntry {
        let dispatched = Dispatched {
            request: ActionRequest::new(IntegrationId::Chat, op).with_param("channel", "#team"),
            result: ActionResult::success(Parameters::new()),
        };
        AuditEntry::new(InstructionId::new(), ActorIdentity::new("u1"), &dispatched, 1)
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/audit.jsonl");
        let log = JsonlAuditLog::open(&path).await.unwrap();

        log.append(entry("post_message")).await.unwrap();
        log.append(entry("post_message")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.action_request.operation, "post_message");
        assert_eq!(parsed.attempts, 1);
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = Arc::new(JsonlAuditLog::open(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                log.append(entry(&format!("op_{i}"))).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 16);
        for line in content.lines() {
            serde_json::from_str::<AuditEntry>(line).unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_write_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.append(entry("first")).await.unwrap();

        {
            let mut file = log.file.lock().await;
            let prev_len = file.metadata().await.unwrap().len();
            file.write_all(b"{\"timestamp\":\"2024").await.unwrap();
            file.flush().await.unwrap();
            truncate_to(&mut file, prev_len).await;
        }
        log.append(entry("second")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let ops: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<AuditEntry>(l).unwrap().action_request.operation)
            .collect();
        assert_eq!(ops, ["first", "second"]);
    }

    #[tokio::test]
    async fn test_open_drops_torn_trailing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut complete = serde_json::to_string(&entry("kept")).unwrap();
        complete.push('\n');
        std::fs::write(&path, format!("{complete}{{\"timestamp\":\"20")).unwrap();

        let log = JsonlAuditLog::open(&path).await.unwrap();
        log.append(entry("after")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let ops: Vec<String> = content
            .lines()
            .map(|l| serde_json::from_str::<AuditEntry>(l).unwrap().action_request.operation)
            .collect();
        assert_eq!(ops, ["kept", "after"]);
    }

    #[tokio::test]
    async fn test_open_drops_file_with_only_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "{\"times").unwrap();

        JsonlAuditLog::open(&path).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        JsonlAuditLog::open(&path)
            .await
            .unwrap()
            .append(entry("a"))
            .await
            .unwrap();
        JsonlAuditLog::open(&path)
            .await
            .unwrap()
            .append(entry("b"))
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
