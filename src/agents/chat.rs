//! 聊天子智能体：向频道发消息
//!
//! 频道优先级：指令中的 #频道 > 语义记忆中的 channel 元数据 > 配置的默认频道。
//! 消息正文去掉"告诉 #频道"这类投递子句；配置了撰写器时由 LLM 改写。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::agents::{find_channel, recall, Composer, SubAgent};
use crate::core::types::{ActionRequest, ClassifiedIntent, IntegrationId};
use crate::memory::SemanticMemory;

pub struct ChatAgent {
    default_channel: String,
    memory: Option<Arc<dyn SemanticMemory>>,
    recall_k: usize,
    composer: Option<Composer>,
}

impl ChatAgent {
    pub fn new(default_channel: impl Into<String>) -> Self {
        Self {
            default_channel: default_channel.into(),
            memory: None,
            recall_k: 3,
            composer: None,
        }
    }

    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn SemanticMemory>, recall_k: usize) -> Self {
        self.memory = Some(memory);
        self.recall_k = recall_k;
        self
    }
}

static LEADING_DELIVERY_RE: OnceLock<Regex> = OnceLock::new();
static TRAILING_DELIVERY_RE: OnceLock<Regex> = OnceLock::new();

/// 去掉投递子句后的消息正文；剩余为空时保留原指令
fn message_text(instruction: &str) -> String {
    let leading = LEADING_DELIVERY_RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:please\s+)?(?:tell|notify|ping|let|(?:post|announce|say|write)(?:\s+(?:in|to|on))?)\s+#[A-Za-z0-9][A-Za-z0-9_-]*(?:\s+know)?\s*(?:that\b|:|,|-)?\s*",
        )
        .unwrap()
    });
    let trailing = TRAILING_DELIVERY_RE.get_or_init(|| {
        Regex::new(
            r"(?i)[\s,;]*(?:\band\s+)?(?:then\s+)?\b(?:tell|notify|ping|let|(?:post|announce)\s+(?:it\s+)?(?:in|to|on))\s+#[A-Za-z0-9][A-Za-z0-9_-]*(?:\s+know)?\s*[.!]?\s*$",
        )
        .unwrap()
    });

    let stripped = leading.replace(instruction, "");
    let stripped = trailing.replace(&stripped, "");
    let text = stripped.trim();
    if text.is_empty() {
        instruction.trim().to_string()
    } else {
        text.to_string()
    }
}

#[async_trait]
impl SubAgent for ChatAgent {
    fn integration(&self) -> IntegrationId {
        IntegrationId::Chat
    }

    async fn plan(&self, instruction: &str, _intent: &ClassifiedIntent) -> Vec<ActionRequest> {
        let recalled = recall(self.memory.as_ref(), instruction, self.recall_k).await;
        let channel = find_channel(instruction)
            .or_else(|| recalled.metadata("channel").map(String::from))
            .unwrap_or_else(|| self.default_channel.clone());

        let composed = match &self.composer {
            Some(composer) => composer.draft_chat(instruction, &recalled.texts()).await,
            None => None,
        };
        let text = composed.unwrap_or_else(|| message_text(instruction));

        let mut request = ActionRequest::new(IntegrationId::Chat, "post_message")
            .with_param("channel", channel)
            .with_param("text", text);
        if let Some(context) = recalled.context() {
            request = request.with_param("context", context);
        }
        vec![request]
    }
}
