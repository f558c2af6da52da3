//! 用 LLM 撰写动作内容：邮件主题与正文、工单标题与描述、频道消息
//!
//! 撰写失败（超时、提供方出错、回复无法解析）时返回 None，子智能体回退到按指令拼出的内容。

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::llm::{json_object, LlmClient, Message};

const EMAIL_PROMPT: &str = r#"You are an email assistant drafting a message on the user's behalf.
Write a professional, clear and concise email that carries out the instruction.
Use the background notes only when they are relevant.

Respond with ONLY a JSON object:
{"subject": "...", "body": "..."}"#;

const ISSUE_PROMPT: &str = r#"You convert requests into structured issue tracker tickets.
Extract a concise but descriptive summary (a title under 80 characters) and a
well-formatted description with the key details and any action items.

Respond with ONLY a JSON object:
{"summary": "...", "description": "..."}"#;

const CHAT_PROMPT: &str = r#"You write short team chat messages.
Turn the instruction into the message the team should read: one or two sentences,
no greeting, no mention of the channel itself.

Respond with ONLY a JSON object:
{"text": "..."}"#;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssueDraft {
    pub summary: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct ChatDraft {
    text: String,
}

/// 子智能体共用的撰写器
#[derive(Clone)]
pub struct Composer {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Composer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn draft_email(
        &self,
        instruction: &str,
        recipient: Option<&str>,
        notes: &[&str],
    ) -> Option<EmailDraft> {
        let mut user = format!("Instruction: {instruction}\n");
        if let Some(to) = recipient {
            user.push_str(&format!("Recipient: {to}\n"));
        }
        push_notes(&mut user, notes);

        let draft: EmailDraft = self.complete_json("email", EMAIL_PROMPT, user).await?;
        (!draft.body.trim().is_empty()).then_some(draft)
    }

    pub async fn draft_issue(
        &self,
        instruction: &str,
        issue_type: &str,
        notes: &[&str],
    ) -> Option<IssueDraft> {
        let mut user = format!("Issue type: {issue_type}\nRequest: {instruction}\n");
        push_notes(&mut user, notes);

        let draft: IssueDraft = self.complete_json("issue", ISSUE_PROMPT, user).await?;
        (!draft.summary.trim().is_empty()).then_some(draft)
    }

    pub async fn draft_chat(&self, instruction: &str, notes: &[&str]) -> Option<String> {
        let mut user = format!("Instruction: {instruction}\n");
        push_notes(&mut user, notes);

        let draft: ChatDraft = self.complete_json("chat", CHAT_PROMPT, user).await?;
        let text = draft.text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    async fn complete_json<T: DeserializeOwned>(
        &self,
        kind: &str,
        system_prompt: &str,
        user: String,
    ) -> Option<T> {
        let messages = vec![Message::system(system_prompt), Message::user(user)];
        let reply = match tokio::time::timeout(self.timeout, self.llm.complete(&messages)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(kind, error = %e, "compose failed, using instruction text");
                return None;
            }
            Err(_) => {
                tracing::warn!(kind, "compose timed out, using instruction text");
                return None;
            }
        };

        match json_object(&reply).map(|json| serde_json::from_str::<T>(json)) {
            Some(Ok(draft)) => Some(draft),
            Some(Err(e)) => {
                tracing::warn!(kind, error = %e, "unparseable compose reply, using instruction text");
                None
            }
            None => {
                tracing::warn!(kind, "compose reply has no JSON object, using instruction text");
                None
            }
        }
    }
}

fn push_notes(user: &mut String, notes: &[&str]) {
    if notes.is_empty() {
        return;
    }
    user.push_str("Background notes:\n");
    for note in notes {
        user.push_str("- ");
        user.push_str(note);
        user.push('\n');
    }
}
