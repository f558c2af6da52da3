//! 意图分类
//!
//! 分析用户指令，得出目标集成（有序）、动作提示与置信度。
//! 先走关键词快速匹配（不调用 LLM），未命中再交给 LLM 输出 JSON。
//! 分类器内部不重试；提供方瞬时失败以 ProviderUnavailable 返回，由编排器决定是否重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::ClassificationError;
use crate::core::types::{ClassifiedIntent, IntegrationId};
use crate::llm::{json_object, LlmClient, LlmError, Message};

/// 快速匹配命中时的置信度
const FAST_MATCH_CONFIDENCE: f32 = 0.9;

/// 意图分类器
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, instruction: &str) -> Result<ClassifiedIntent, ClassificationError>;
}

/// 每个集成的关键词（按词匹配，"#频道" 单独识别）
fn keywords(id: IntegrationId) -> &'static [&'static str] {
    match id {
        IntegrationId::Mail => &[
            "email", "emails", "mail", "inbox", "unread", "reply", "gmail", "draft",
        ],
        IntegrationId::Calendar => &[
            "meeting", "meetings", "calendar", "schedule", "reschedule", "event", "events",
            "appointment", "agenda", "book", "slot", "slots",
        ],
        IntegrationId::Chat => &[
            "slack", "channel", "tell", "notify", "ping", "post", "announce",
        ],
        IntegrationId::IssueTracker => &[
            "jira", "ticket", "tickets", "issue", "issues", "bug", "backlog", "sprint",
        ],
    }
}

fn tokenize(input: &str) -> Vec<String> {
    input
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '#' | '-' | '_' | '@' | '.')))
        .map(|w| w.trim_matches(|c| c == '.' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// 基于 LLM 的意图分类器，带关键词快速路径
pub struct LlmIntentClassifier {
    llm: Arc<dyn LlmClient>,
    /// 启用快速规则匹配（不调用 LLM）
    enable_fast_match: bool,
    request_timeout: Duration,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            enable_fast_match: true,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_fast_match(mut self, enable: bool) -> Self {
        self.enable_fast_match = enable;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 快速规则匹配：目标按首个命中词在指令中的位置排序
    fn fast_match(&self, input: &str) -> Option<ClassifiedIntent> {
        let tokens = tokenize(input);
        let mut hits: Vec<(usize, IntegrationId, String)> = Vec::new();

        for id in IntegrationId::ALL {
            let first = tokens.iter().enumerate().find(|(_, t)| {
                keywords(id).contains(&t.as_str())
                    || (id == IntegrationId::Chat && t.starts_with('#') && t.len() > 1)
                    || (id == IntegrationId::Mail && t.contains('@') && t.contains('.'))
                    || (id == IntegrationId::IssueTracker && is_issue_key(t))
            });
            if let Some((pos, token)) = first {
                hits.push((pos, id, token.clone()));
            }
        }

        if hits.is_empty() {
            return None;
        }
        hits.sort_by_key(|(pos, _, _)| *pos);
        let hint = hits[0].2.trim_start_matches('#').to_string();
        Some(ClassifiedIntent::new(
            hits.into_iter().map(|(_, id, _)| id),
            hint,
            FAST_MATCH_CONFIDENCE,
        ))
    }

    /// 使用 LLM 分类
    async fn llm_classify(&self, instruction: &str) -> Result<ClassifiedIntent, ClassificationError> {
        let system_prompt = r#"You route user instructions to workplace integrations.
Available integrations: mail, calendar, chat, issue_tracker.

Respond with ONLY a JSON object, no explanation:
{"integrations": ["calendar", "chat"], "action_hint": "reschedule_meeting", "confidence": 0.85}

- integrations: every integration the instruction needs, in the order they should be handled
- action_hint: a short snake_case verb phrase for the main action
- confidence: a number between 0 and 1
If the instruction needs none of them, return an empty integrations list."#;

        let messages = vec![
            Message::system(system_prompt),
            Message::user(format!("Instruction: {}", instruction)),
        ];

        let response = tokio::time::timeout(self.request_timeout, self.llm.complete(&messages))
            .await
            .map_err(|_| ClassificationError::ProviderUnavailable("request timed out".into()))?
            .map_err(|e| match e {
                LlmError::InvalidRequest(m) => ClassificationError::Unrecognized(m),
                other => ClassificationError::ProviderUnavailable(other.to_string()),
            })?;

        let (prompt, completion, total) = self.llm.token_usage();
        tracing::debug!(prompt, completion, total, "llm classification token usage (cumulative)");

        parse_llm_reply(&response)
    }
}

#[derive(Debug, Deserialize)]
struct LlmReply {
    #[serde(default)]
    integrations: Vec<String>,
    #[serde(default)]
    action_hint: String,
    #[serde(default)]
    confidence: f32,
}

/// 解析模型回复：容忍 JSON 前后的多余文字或 Markdown 代码块
fn parse_llm_reply(response: &str) -> Result<ClassifiedIntent, ClassificationError> {
    let json = json_object(response).ok_or_else(|| {
        ClassificationError::Unrecognized(format!("no JSON object in reply: {}", preview(response)))
    })?;

    let reply: LlmReply = serde_json::from_str(json)
        .map_err(|e| ClassificationError::Unrecognized(format!("bad classification JSON: {e}")))?;

    let targets: Vec<IntegrationId> = reply
        .integrations
        .iter()
        .filter_map(|s| {
            let id = IntegrationId::parse(s);
            if id.is_none() {
                tracing::debug!(integration = %s, "ignoring unknown integration from classifier");
            }
            id
        })
        .collect();

    if targets.is_empty() {
        return Err(ClassificationError::Unrecognized(format!(
            "no known integration for action '{}'",
            reply.action_hint
        )));
    }

    Ok(ClassifiedIntent::new(targets, reply.action_hint, reply.confidence))
}

fn preview(s: &str) -> String {
    if s.chars().count() > 120 {
        format!("{}...", s.chars().take(120).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 形如 ABC-123 的工单号（tokenize 后为小写）
fn is_issue_key(token: &str) -> bool {
    match token.split_once('-') {
        Some((project, number)) => {
            !project.is_empty()
                && project.chars().all(|c| c.is_ascii_alphanumeric())
                && project.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, instruction: &str) -> Result<ClassifiedIntent, ClassificationError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ClassificationError::EmptyInput);
        }

        if self.enable_fast_match {
            if let Some(intent) = self.fast_match(instruction) {
                tracing::debug!(targets = ?intent.target_integrations(), "fast-matched instruction");
                return Ok(intent);
            }
        }

        self.llm_classify(instruction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn classifier(llm: MockLlmClient) -> LlmIntentClassifier {
        LlmIntentClassifier::new(Arc::new(llm))
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let c = classifier(MockLlmClient::new());
        assert_eq!(c.classify("   ").await, Err(ClassificationError::EmptyInput));
        assert_eq!(c.classify("").await, Err(ClassificationError::EmptyInput));
    }

    #[test]
    fn test_fast_match_calendar() {
        let c = classifier(MockLlmClient::new());
        let intent = c.fast_match("what meetings do I have today").unwrap();
        assert_eq!(intent.target_integrations(), &[IntegrationId::Calendar]);
        assert!((intent.confidence() - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_fast_match_orders_by_position() {
        let c = classifier(MockLlmClient::new());
        let intent = c
            .fast_match("reschedule my 3pm meeting and tell #team")
            .unwrap();
        assert_eq!(
            intent.target_integrations(),
            &[IntegrationId::Calendar, IntegrationId::Chat]
        );
        assert_eq!(intent.action_hint(), "reschedule");

        let intent = c.fast_match("post in #eng that OPS-42 is fixed").unwrap();
        assert_eq!(
            intent.target_integrations(),
            &[IntegrationId::Chat, IntegrationId::IssueTracker]
        );
    }

    #[test]
    fn test_fast_match_email_address() {
        let c = classifier(MockLlmClient::new());
        let intent = c.fast_match("forward the deck to ana@example.com.").unwrap();
        assert_eq!(intent.target_integrations(), &[IntegrationId::Mail]);
    }

    #[test]
    fn test_fast_match_miss() {
        let c = classifier(MockLlmClient::new());
        assert!(c.fast_match("how are you").is_none());
    }

    #[tokio::test]
    async fn test_llm_fallback_parses_json() {
        let llm = MockLlmClient::with_replies([Ok(
            "```json\n{\"integrations\": [\"jira\", \"email\"], \"action_hint\": \"file_report\", \"confidence\": 0.8}\n```"
                .to_string(),
        )]);
        let c = classifier(llm);
        let intent = c.classify("let finance know about the outage").await.unwrap();
        assert_eq!(
            intent.target_integrations(),
            &[IntegrationId::IssueTracker, IntegrationId::Mail]
        );
        assert_eq!(intent.action_hint(), "file_report");
    }

    #[tokio::test]
    async fn test_llm_unavailable_maps_to_provider_unavailable() {
        let llm = MockLlmClient::with_replies([Err(LlmError::Unavailable("503".into()))]);
        let c = classifier(llm);
        let err = c.classify("hello there").await.unwrap_err();
        assert!(matches!(err, ClassificationError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_llm_empty_targets_unrecognized() {
        let c = classifier(MockLlmClient::new());
        let err = c.classify("hello there").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Unrecognized(_)));
    }

    #[test]
    fn test_issue_key() {
        assert!(is_issue_key("ops-42"));
        assert!(!is_issue_key("follow-up"));
        assert!(!is_issue_key("-42"));
    }
}
