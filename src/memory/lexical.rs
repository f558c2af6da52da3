//! 词重叠语义记忆（无真实向量，适合本地运行与测试）
//!
//! 得分 = 查询词与片段词的交集大小 / 查询词数，范围 [0, 1]；超出容量时丢弃最旧片段。

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::memory::{rank, MemoryError, Metadata, Recollection, SemanticMemory};

struct Stored {
    id: String,
    text: String,
    metadata: Metadata,
    tokens: HashSet<String>,
}

pub struct InMemorySemanticMemory {
    store: RwLock<Vec<Stored>>,
    max_entries: usize,
}

/// 将文本切分为小写词集合，用于简单相似度（词重叠数）
fn tokenize_lower(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric() && c != '#' && c != '@')
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() > 1)
        .collect()
}

impl InMemorySemanticMemory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemorySemanticMemory {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl SemanticMemory for InMemorySemanticMemory {
    async fn remember(&self, text: &str, metadata: Metadata) -> Result<String, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::EmptyText);
        }
        let id = Uuid::new_v4().to_string();
        let stored = Stored {
            id: id.clone(),
            text: text.to_string(),
            metadata,
            tokens: tokenize_lower(text),
        };
        let mut store = match self.store.write() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        store.push(stored);
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
        Ok(id)
    }

    async fn recall(&self, query: &str, k: usize) -> Result<Vec<Recollection>, MemoryError> {
        let query_tokens = tokenize_lower(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let store = match self.store.read() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let scored: Vec<Recollection> = store
            .iter()
            .filter_map(|s| {
                let overlap = query_tokens.intersection(&s.tokens).count();
                (overlap > 0).then(|| Recollection {
                    id: s.id.clone(),
                    text: s.text.clone(),
                    metadata: s.metadata.clone(),
                    score: overlap as f32 / query_tokens.len() as f32,
                })
            })
            .collect();
        Ok(rank(scored, k))
    }
}
