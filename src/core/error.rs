//! 错误分类
//!
//! 分类失败短路（无副作用）；单个动作失败在子智能体边界内收敛为 ActionResult::Failure；
//! 审计写入失败对整条指令致命（SystemError）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 意图分类失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassificationError {
    #[error("instruction is empty")]
    EmptyInput,

    #[error("classification provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("classification confidence {confidence:.2} below threshold {threshold:.2}")]
    LowConfidence { confidence: f32, threshold: f32 },

    /// 模型输出无法解析或未给出任何目标集成
    #[error("instruction not recognized: {0}")]
    Unrecognized(String),
}

impl ClassificationError {
    /// 仅提供方不可用时值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassificationError::ProviderUnavailable(_))
    }
}

/// 动作失败类型；retryable 由类型推导
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthExpired,
    RateLimited,
    NotFound,
    InvalidArgument,
    ProviderUnavailable,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::ProviderUnavailable)
    }
}

/// 审计日志写入失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuditError {
    #[error("audit write failed: {0}")]
    WriteFailed(String),
}

/// 致命错误：调用方需整体重试该指令
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    #[error("side effect could not be audited, retry the whole instruction: {0}")]
    Audit(#[from] AuditError),

    /// 请求被取消；已发出的动作仍已完成并审计
    #[error("request cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let retryable: Vec<ErrorKind> = [
            ErrorKind::AuthExpired,
            ErrorKind::RateLimited,
            ErrorKind::NotFound,
            ErrorKind::InvalidArgument,
            ErrorKind::ProviderUnavailable,
            ErrorKind::Unknown,
        ]
        .into_iter()
        .filter(|k| k.is_retryable())
        .collect();
        assert_eq!(
            retryable,
            vec![ErrorKind::RateLimited, ErrorKind::ProviderUnavailable]
        );
    }

    #[test]
    fn test_only_provider_unavailable_classification_retries() {
        assert!(ClassificationError::ProviderUnavailable("503".into()).is_retryable());
        assert!(!ClassificationError::EmptyInput.is_retryable());
        assert!(!ClassificationError::Unrecognized("?".into()).is_retryable());
    }

    #[test]
    fn test_system_error_from_audit() {
        let err: SystemError = AuditError::WriteFailed("disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
