//! 核心数据模型：指令、意图、动作请求/结果、审计条目、聚合响应
//!
//! 除 AggregatedResponse 外均为不可变值；一次指令的生命周期内由编排器持有。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::error::ErrorKind;

/// 动作参数 / 返回载荷：字符串键到 JSON 值的映射
pub type Parameters = Map<String, Value>;

/// 外部服务类别（闭集）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationId {
    Mail,
    Calendar,
    Chat,
    IssueTracker,
}

impl IntegrationId {
    pub const ALL: [IntegrationId; 4] = [
        IntegrationId::Mail,
        IntegrationId::Calendar,
        IntegrationId::Chat,
        IntegrationId::IssueTracker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationId::Mail => "mail",
            IntegrationId::Calendar => "calendar",
            IntegrationId::Chat => "chat",
            IntegrationId::IssueTracker => "issue_tracker",
        }
    }

    /// 向凭据提供方申请令牌时使用的作用域
    pub fn scope(&self) -> &'static str {
        match self {
            IntegrationId::Mail => "https://www.googleapis.com/auth/gmail.modify",
            IntegrationId::Calendar => "https://www.googleapis.com/auth/calendar.events",
            IntegrationId::Chat => "chat:write",
            IntegrationId::IssueTracker => "write:jira-work",
        }
    }

    /// 宽松解析（接受 LLM 常见的同义写法）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "mail" | "email" | "gmail" => Some(IntegrationId::Mail),
            "calendar" | "google_calendar" => Some(IntegrationId::Calendar),
            "chat" | "slack" => Some(IntegrationId::Chat),
            "issue_tracker" | "issuetracker" | "jira" | "issues" => {
                Some(IntegrationId::IssueTracker)
            }
            _ => None,
        }
    }
}

impl fmt::Display for IntegrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条指令的唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstructionId(Uuid);

impl InstructionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstructionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 已认证的调用者身份（由入口层给出，核心不做校验）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorIdentity(String);

impl ActorIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 意图分类结果；target_integrations 有序且去重，成功分类时非空
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    target_integrations: Vec<IntegrationId>,
    action_hint: String,
    confidence: f32,
}

impl ClassifiedIntent {
    /// 去重（保留首次出现的位置），置信度截断到 [0, 1]
    pub fn new(
        targets: impl IntoIterator<Item = IntegrationId>,
        action_hint: impl Into<String>,
        confidence: f32,
    ) -> Self {
        let mut target_integrations = Vec::new();
        for id in targets {
            if !target_integrations.contains(&id) {
                target_integrations.push(id);
            }
        }
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            target_integrations,
            action_hint: action_hint.into(),
            confidence,
        }
    }

    pub fn target_integrations(&self) -> &[IntegrationId] {
        &self.target_integrations
    }

    pub fn action_hint(&self) -> &str {
        &self.action_hint
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn targets(&self, id: IntegrationId) -> bool {
        self.target_integrations.contains(&id)
    }
}

/// 子智能体产出、执行器消费的一次具体外部操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub integration: IntegrationId,
    pub operation: String,
    pub parameters: Parameters,
}

impl ActionRequest {
    pub fn new(integration: IntegrationId, operation: impl Into<String>) -> Self {
        Self {
            integration,
            operation: operation.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// 单个动作的结果；Failure 的 retryable 始终由 kind 推导
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Success {
        payload: Parameters,
    },
    Failure {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}

impl ActionResult {
    pub fn success(payload: Parameters) -> Self {
        ActionResult::Success { payload }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        ActionResult::Failure {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionResult::Failure { retryable: true, .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ActionResult::Success { .. } => None,
            ActionResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// 已发出的请求及其结果（子智能体按发出顺序返回）
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub request: ActionRequest,
    pub result: ActionResult,
}

/// 审计条目：每个动作一条，只追加
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub instruction_id: InstructionId,
    pub integration: IntegrationId,
    pub action_request: ActionRequest,
    pub action_result: ActionResult,
    pub actor_identity: ActorIdentity,
    /// 执行次数（含重试），重试不会产生第二条记录
    pub attempts: u32,
}

impl AuditEntry {
    pub fn new(
        instruction_id: InstructionId,
        actor_identity: ActorIdentity,
        dispatched: &Dispatched,
        attempts: u32,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            instruction_id,
            integration: dispatched.request.integration,
            action_request: dispatched.request.clone(),
            action_result: dispatched.result.clone(),
            actor_identity,
            attempts,
        }
    }
}

/// 整体状态；HTTP 层据此映射状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    AllSucceeded,
    PartialFailure,
    AllFailed,
    ClassificationFailed,
}

impl OverallStatus {
    /// 空结果序列视为全部成功
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ActionResult>) -> Self {
        let (mut ok, mut failed) = (0usize, 0usize);
        for r in results {
            if r.is_success() {
                ok += 1;
            } else {
                failed += 1;
            }
        }
        match (ok, failed) {
            (_, 0) => OverallStatus::AllSucceeded,
            (0, _) => OverallStatus::AllFailed,
            _ => OverallStatus::PartialFailure,
        }
    }
}

/// 单个结果在响应中的位置：所属集成 + 动作结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub integration: IntegrationId,
    pub operation: String,
    pub result: ActionResult,
}

/// 返回给调用方的聚合响应（每条指令一份，不跨请求保留）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub instruction_id: InstructionId,
    pub results: Vec<IntegrationResult>,
    pub overall_status: OverallStatus,
    /// 分类失败原因
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AggregatedResponse {
    pub fn classification_failed(instruction_id: InstructionId, reason: impl Into<String>) -> Self {
        Self {
            instruction_id,
            results: Vec::new(),
            overall_status: OverallStatus::ClassificationFailed,
            detail: Some(reason.into()),
        }
    }

    pub fn from_results(instruction_id: InstructionId, results: Vec<IntegrationResult>) -> Self {
        let overall_status = OverallStatus::from_results(results.iter().map(|r| &r.result));
        Self {
            instruction_id,
            results,
            overall_status,
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> ActionResult {
        ActionResult::success(Parameters::new())
    }

    #[test]
    fn test_intent_dedups_targets_in_order() {
        let intent = ClassifiedIntent::new(
            [
                IntegrationId::Chat,
                IntegrationId::Calendar,
                IntegrationId::Chat,
            ],
            "notify",
            1.7,
        );
        assert_eq!(
            intent.target_integrations(),
            &[IntegrationId::Chat, IntegrationId::Calendar]
        );
        assert_eq!(intent.confidence(), 1.0);
    }

    #[test]
    fn test_failure_retryable_follows_kind() {
        assert!(ActionResult::failure(ErrorKind::RateLimited, "slow down").is_retryable());
        assert!(ActionResult::failure(ErrorKind::ProviderUnavailable, "503").is_retryable());
        assert!(!ActionResult::failure(ErrorKind::NotFound, "gone").is_retryable());
        assert!(!ActionResult::failure(ErrorKind::AuthExpired, "expired").is_retryable());
    }

    #[test]
    fn test_overall_status() {
        let fail = ActionResult::failure(ErrorKind::Unknown, "boom");
        assert_eq!(OverallStatus::from_results([]), OverallStatus::AllSucceeded);
        assert_eq!(
            OverallStatus::from_results([&ok(), &ok()]),
            OverallStatus::AllSucceeded
        );
        assert_eq!(
            OverallStatus::from_results([&ok(), &fail]),
            OverallStatus::PartialFailure
        );
        assert_eq!(
            OverallStatus::from_results([&fail, &fail]),
            OverallStatus::AllFailed
        );
    }

    #[test]
    fn test_integration_parse_aliases() {
        assert_eq!(IntegrationId::parse("Slack"), Some(IntegrationId::Chat));
        assert_eq!(IntegrationId::parse("issue-tracker"), Some(IntegrationId::IssueTracker));
        assert_eq!(IntegrationId::parse("gmail"), Some(IntegrationId::Mail));
        assert_eq!(IntegrationId::parse("fax"), None);
    }

    #[test]
    fn test_action_result_serializes_tagged() {
        let json = serde_json::to_value(ActionResult::failure(ErrorKind::RateLimited, "429")).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["kind"], "rate_limited");
        assert_eq!(json["retryable"], true);
    }
}
