//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按顺序返回预置回复；预置耗尽后返回 fallback（默认为低置信度的 "unclear" 分类）。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

const UNCLEAR_REPLY: &str = r#"{"integrations": [], "action_hint": "unclear", "confidence": 0.0}"#;

pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: UNCLEAR_REPLY.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    /// 预置回复（按调用顺序消费）
    pub fn with_replies(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::new()
        }
    }

    /// 预置耗尽后的固定回复
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = reply.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.replies.lock() {
            Ok(mut q) => q.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
