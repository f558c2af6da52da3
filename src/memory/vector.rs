//! 向量语义记忆：写入时嵌入文本，召回时按余弦相似度排序

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::llm::EmbeddingProvider;
use crate::memory::{rank, MemoryError, Metadata, Recollection, SemanticMemory};

struct Stored {
    id: String,
    text: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

pub struct EmbeddingSemanticMemory {
    embedder: Arc<dyn EmbeddingProvider>,
    store: RwLock<Vec<Stored>>,
    max_entries: usize,
}

impl EmbeddingSemanticMemory {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, max_entries: usize) -> Self {
        Self {
            embedder,
            store: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }
}

/// 余弦相似度；维度不一致或零向量时为 0
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl SemanticMemory for EmbeddingSemanticMemory {
    async fn remember(&self, text: &str, metadata: Metadata) -> Result<String, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::EmptyText);
        }
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::Embedding)?;
        let id = Uuid::new_v4().to_string();

        let mut store = self.store.write().await;
        store.push(Stored {
            id: id.clone(),
            text: text.to_string(),
            metadata,
            vector,
        });
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
        Ok(id)
    }

    async fn recall(&self, query: &str, k: usize) -> Result<Vec<Recollection>, MemoryError> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let q = self
            .embedder
            .embed(query)
            .await
            .map_err(MemoryError::Embedding)?;
        let store = self.store.read().await;
        let scored = store
            .iter()
            .map(|s| Recollection {
                id: s.id.clone(),
                text: s.text.clone(),
                metadata: s.metadata.clone(),
                score: cosine(&q, &s.vector),
            })
            .filter(|r| r.score > 0.0)
            .collect();
        Ok(rank(scored, k))
    }
}
