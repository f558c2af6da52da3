//! 邮件子智能体：列出未读、发送邮件、保存草稿
//!
//! 配置了撰写器时由 LLM 起草主题与正文，否则用指令首行作主题、指令原文作正文。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{any_word, find_email, recall, words, Composer, SubAgent};
use crate::core::types::{ActionRequest, ClassifiedIntent, IntegrationId};
use crate::memory::SemanticMemory;

/// 列表操作的默认条数
const LIST_LIMIT: u64 = 10;

pub struct MailAgent {
    memory: Option<Arc<dyn SemanticMemory>>,
    recall_k: usize,
    composer: Option<Composer>,
}

impl MailAgent {
    pub fn new() -> Self {
        Self {
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

impl Default for MailAgent {
    fn default() -> Self {
        Self::new()
    }
}

fn subject_from(instruction: &str) -> String {
    let first_line = instruction.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() > 60 {
        format!("{}...", first_line.chars().take(60).collect::<String>())
    } else {
        first_line.to_string()
    }
}

#[async_trait]
impl SubAgent for MailAgent {
    fn integration(&self) -> IntegrationId {
        IntegrationId::Mail
    }

    async fn plan(&self, instruction: &str, intent: &ClassifiedIntent) -> Vec<ActionRequest> {
        let w = words(instruction, intent);
        let wants_send = any_word(&w, &["send", "reply", "forward", "email", "write"]);
        let wants_draft = any_word(&w, &["draft"]);
        let reads = any_word(&w, &["unread", "inbox", "check", "read", "list", "show"]);

        let lookup_only = reads && !wants_draft && find_email(instruction).is_none();
        if lookup_only || !(wants_send || wants_draft) {
            return vec![ActionRequest::new(IntegrationId::Mail, "list_messages")
                .with_param("query", "is:unread")
                .with_param("max_results", LIST_LIMIT)];
        }

        let recalled = recall(self.memory.as_ref(), instruction, self.recall_k).await;
        let recipient = find_email(instruction).or_else(|| recalled.metadata("email").map(String::from));

        // 没有收件人时不直接发送，只保存草稿
        let operation = match (&recipient, wants_draft) {
            (Some(_), false) => "send_email",
            _ => "create_draft",
        };
        let draft = match &self.composer {
            Some(composer) => {
                composer
                    .draft_email(instruction, recipient.as_deref(), &recalled.texts())
                    .await
            }
            None => None,
        };
        let (subject, body) = match draft {
            Some(d) if !d.subject.trim().is_empty() => (d.subject, d.body),
            Some(d) => (subject_from(instruction), d.body),
            None => (subject_from(instruction), instruction.to_string()),
        };

        let mut request = ActionRequest::new(IntegrationId::Mail, operation)
            .with_param("subject", subject)
            .with_param("body", body);
        if let Some(to) = recipient {
            request = request.with_param("to", to);
        }
        if let Some(context) = recalled.context() {
            request = request.with_param("context", context);
        }
        vec![request]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::{InMemorySemanticMemory, Metadata};

    fn intent(hint: &str) -> ClassifiedIntent {
        ClassifiedIntent::new([IntegrationId::Mail], hint, 0.9)
    }

    #[tokio::test]
    async fn test_composer_drafts_subject_and_body() {
        let llm = Arc::new(MockLlmClient::with_replies([Ok(
            r#"{"subject": "Q3 numbers", "body": "Hi Ana,\n\nPlease find the Q3 numbers attached."}"#
                .to_string(),
        )]));
        let plan = MailAgent::new()
            .with_composer(Composer::new(llm.clone()))
            .plan("send the Q3 numbers to ana@example.com", &intent("send"))
            .await;
        assert_eq!(plan[0].operation, "send_email");
        assert_eq!(plan[0].parameters["subject"], "Q3 numbers");
        assert_eq!(
            plan[0].parameters["body"],
            "Hi Ana,\n\nPlease find the Q3 numbers attached."
        );
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_composer_failure_falls_back_to_instruction() {
        let llm = Arc::new(MockLlmClient::with_replies([Err(LlmError::Unavailable(
            "503".into(),
        ))]));
        let plan = MailAgent::new()
            .with_composer(Composer::new(llm))
            .plan("send an email about the outage", &intent("email"))
            .await;
        assert_eq!(plan[0].operation, "create_draft");
        assert_eq!(plan[0].parameters["body"], "send an email about the outage");
        assert_eq!(plan[0].parameters["subject"], "send an email about the outage");
    }

    #[tokio::test]
    async fn test_listing_does_not_compose() {
        let llm = Arc::new(MockLlmClient::new());
        let plan = MailAgent::new()
            .with_composer(Composer::new(llm.clone()))
            .plan("any unread mail in my inbox?", &intent("unread"))
            .await;
        assert_eq!(plan[0].operation, "list_messages");
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_unread_lists_messages() {
        let plan = MailAgent::new()
            .plan("any unread mail in my inbox?", &intent("unread"))
            .await;
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].operation, "list_messages");
        assert_eq!(plan[0].parameters["max_results"], 10);
    }

    #[tokio::test]
    async fn test_send_with_address() {
        let plan = MailAgent::new()
            .plan("send the Q3 numbers to ana@example.com", &intent("send"))
            .await;
        assert_eq!(plan[0].operation, "send_email");
        assert_eq!(plan[0].parameters["to"], "ana@example.com");
    }

    #[tokio::test]
    async fn test_send_without_recipient_saves_draft() {
        let plan = MailAgent::new()
            .plan("send an email about the outage", &intent("email"))
            .await;
        assert_eq!(plan[0].operation, "create_draft");
        assert!(!plan[0].parameters.contains_key("to"));
    }

    #[tokio::test]
    async fn test_recipient_from_memory() {
        let memory: Arc<dyn SemanticMemory> = Arc::new(InMemorySemanticMemory::default());
        let mut meta = Metadata::new();
        meta.insert("email".into(), "finance@example.com".into());
        memory
            .remember("finance team mailbox", meta)
            .await
            .unwrap();

        let plan = MailAgent::new()
            .with_memory(memory, 3)
            .plan("email finance the invoice", &intent("email"))
            .await;
        assert_eq!(plan[0].operation, "send_email");
        assert_eq!(plan[0].parameters["to"], "finance@example.com");
        assert!(plan[0].parameters.contains_key("context"));
    }
}
