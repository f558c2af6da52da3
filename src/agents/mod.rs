//! 集成子智能体：把自然语言意图翻译为某个集成的零到多个动作请求
//!
//! 每个子智能体只负责一个 IntegrationId；plan 决定要发出哪些请求，
//! handle 按发出顺序逐个分发，失败不短路，结果与请求一一对应。
//! 子智能体从不写审计（审计只由编排器写）。

pub mod calendar;
pub mod chat;
pub mod compose;
pub mod issue_tracker;
pub mod mail;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::types::{ActionRequest, ActorIdentity, ClassifiedIntent, Dispatched, IntegrationId};
use crate::integrations::ActionDispatcher;
use crate::memory::{Recollection, SemanticMemory};

pub use calendar::CalendarAgent;
pub use chat::ChatAgent;
pub use compose::{Composer, EmailDraft, IssueDraft};
pub use issue_tracker::IssueTrackerAgent;
pub use mail::MailAgent;

/// 一次 handle 调用所需的外部依赖
pub struct DispatchContext<'a> {
    pub dispatcher: &'a ActionDispatcher,
    pub actor: &'a ActorIdentity,
    pub cancel: &'a CancellationToken,
}

#[async_trait]
pub trait SubAgent: Send + Sync {
    fn integration(&self) -> IntegrationId;

    /// 规划动作请求（可查询语义记忆，不产生外部副作用）
    async fn plan(&self, instruction: &str, intent: &ClassifiedIntent) -> Vec<ActionRequest>;

    /// 规划并按顺序分发；取消后不再发出新请求，已发出的照常返回
    async fn handle(
        &self,
        instruction: &str,
        intent: &ClassifiedIntent,
        ctx: &DispatchContext<'_>,
    ) -> Vec<Dispatched> {
        let requests = self.plan(instruction, intent).await;
        let mut dispatched = Vec::with_capacity(requests.len());
        for request in requests {
            if ctx.cancel.is_cancelled() {
                tracing::info!(
                    integration = %self.integration(),
                    operation = %request.operation,
                    "cancelled before dispatch, skipping remaining requests"
                );
                break;
            }
            let result = ctx.dispatcher.dispatch(&request, ctx.actor).await;
            dispatched.push(Dispatched { request, result });
        }
        dispatched
    }
}

/// 子智能体注册表：IntegrationId -> SubAgent
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<IntegrationId, Arc<dyn SubAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册子智能体，同一集成后注册者覆盖先注册者
    pub fn register(&mut self, agent: impl SubAgent + 'static) {
        self.register_arc(Arc::new(agent));
    }

    pub fn register_arc(&mut self, agent: Arc<dyn SubAgent>) {
        self.agents.insert(agent.integration(), agent);
    }

    pub fn get(&self, id: IntegrationId) -> Option<Arc<dyn SubAgent>> {
        self.agents.get(&id).cloned()
    }

    pub fn contains(&self, id: IntegrationId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// 子智能体的语义记忆视图：召回一次，按元数据键补参数
pub(crate) struct Recalled {
    hits: Vec<Recollection>,
}

impl Recalled {
    pub(crate) fn empty() -> Self {
        Self { hits: Vec::new() }
    }

    /// 得分最高且带有该元数据键的值
    pub(crate) fn metadata(&self, key: &str) -> Option<&str> {
        self.hits
            .iter()
            .find_map(|r| r.metadata.get(key).map(String::as_str))
    }

    /// 召回文本，供撰写时作为背景
    pub(crate) fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|r| r.text.as_str()).collect()
    }

    /// 召回文本，附到请求的 context 参数上
    pub(crate) fn context(&self) -> Option<Value> {
        if self.hits.is_empty() {
            return None;
        }
        Some(Value::Array(
            self.hits.iter().map(|r| Value::String(r.text.clone())).collect(),
        ))
    }
}

/// 查询语义记忆；失败时只记录日志，按无上下文继续
pub(crate) async fn recall(
    memory: Option<&Arc<dyn SemanticMemory>>,
    instruction: &str,
    k: usize,
) -> Recalled {
    let Some(memory) = memory else {
        return Recalled::empty();
    };
    match memory.recall(instruction, k).await {
        Ok(hits) => Recalled { hits },
        Err(e) => {
            tracing::warn!(error = %e, "semantic memory recall failed, continuing without context");
            Recalled::empty()
        }
    }
}

/// 指令与动作提示中的小写词（提示中的下划线视为分隔）
pub(crate) fn words(instruction: &str, intent: &ClassifiedIntent) -> HashSet<String> {
    instruction
        .split(|c: char| !c.is_alphanumeric())
        .chain(intent.action_hint().split(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

pub(crate) fn any_word(words: &HashSet<String>, candidates: &[&str]) -> bool {
    candidates.iter().any(|c| words.contains(*c))
}

static CHANNEL_RE: OnceLock<Regex> = OnceLock::new();
static ISSUE_KEY_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
static TIME_RE: OnceLock<Regex> = OnceLock::new();

/// 第一个 #频道 提及（保留 #）
pub(crate) fn find_channel(text: &str) -> Option<String> {
    let re = CHANNEL_RE.get_or_init(|| Regex::new(r"(?:^|\s)(#[A-Za-z0-9][A-Za-z0-9_-]*)").unwrap());
    re.captures(text).map(|c| c[1].to_string())
}

/// 第一个工单号，如 OPS-42
pub(crate) fn find_issue_key(text: &str) -> Option<String> {
    let re = ISSUE_KEY_RE.get_or_init(|| Regex::new(r"\b([A-Z][A-Z0-9]+-\d+)\b").unwrap());
    re.captures(text).map(|c| c[1].to_string())
}

pub(crate) fn find_email(text: &str) -> Option<String> {
    let re = EMAIL_RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
    });
    re.find(text).map(|m| m.as_str().to_string())
}

/// 口语时间，如 3pm / 10:30 am（统一为小写、去空格）
pub(crate) fn find_time(text: &str) -> Option<String> {
    let re = TIME_RE.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2}(?::\d{2})?)\s?(am|pm)\b").unwrap());
    re.captures(text)
        .map(|c| format!("{}{}", &c[1], c[2].to_lowercase()))
}
