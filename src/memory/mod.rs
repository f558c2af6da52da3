//! 语义记忆：按相似度存取短文本片段，供子智能体补全上下文
//!
//! 契约：remember(text, metadata) -> id；recall(query, k) 按得分降序返回 (text, metadata, score)。
//! 每次调用互相独立；跨会话个性化需要额外的身份键，当前不区分调用者。

pub mod lexical;
pub mod vector;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use lexical::InMemorySemanticMemory;
pub use vector::EmbeddingSemanticMemory;

/// 片段元数据
pub type Metadata = BTreeMap<String, String>;

/// 召回结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recollection {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error("cannot remember empty text")]
    EmptyText,

    #[error("embedding failed: {0}")]
    Embedding(String),
}

#[async_trait]
pub trait SemanticMemory: Send + Sync {
    async fn remember(&self, text: &str, metadata: Metadata) -> Result<String, MemoryError>;

    async fn recall(&self, query: &str, k: usize) -> Result<Vec<Recollection>, MemoryError>;
}

/// 按得分降序排序（稳定排序，同分保持写入顺序）并截断到 k
pub(crate) fn rank(mut scored: Vec<Recollection>, k: usize) -> Vec<Recollection> {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}
