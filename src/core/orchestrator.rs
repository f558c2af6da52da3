//! 编排器：单条指令的完整生命周期
//!
//! 分类（提供方不可用时按退避重试一次）→ 置信度门限 → 按目标集成并发调用子智能体 →
//! 对可重试失败只重放失败的那个请求 → 每个结果先写审计再放入响应 → 计算整体状态。
//! 结果顺序：先按集成在 target_integrations 中的位置，集成内按请求发出顺序。

use std::sync::Arc;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agents::{AgentRegistry, DispatchContext};
use crate::audit::AuditLog;
use crate::core::error::{AuditError, ClassificationError, ErrorKind, SystemError};
use crate::core::intent::IntentClassifier;
use crate::core::retry::RetryPolicy;
use crate::core::types::{
    ActionRequest, ActionResult, ActorIdentity, AggregatedResponse, AuditEntry, ClassifiedIntent,
    Dispatched, InstructionId, IntegrationId, IntegrationResult,
};
use crate::integrations::ActionDispatcher;

/// 默认置信度门限
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

pub struct Orchestrator {
    classifier: Arc<dyn IntentClassifier>,
    agents: AgentRegistry,
    dispatcher: Arc<ActionDispatcher>,
    audit: Arc<dyn AuditLog>,
    confidence_threshold: f32,
    retry: RetryPolicy,
}

/// 单个集成的处理结果
struct IntegrationOutcome {
    results: Vec<IntegrationResult>,
    audit_error: Option<AuditError>,
}

/// 一条指令内共享的只读上下文
struct Invocation<'a> {
    instruction_id: InstructionId,
    instruction: &'a str,
    intent: &'a ClassifiedIntent,
    actor: &'a ActorIdentity,
    cancel: &'a CancellationToken,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        agents: AgentRegistry,
        dispatcher: Arc<ActionDispatcher>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            classifier,
            agents,
            dispatcher,
            audit,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub async fn process(
        &self,
        instruction: &str,
        actor: &ActorIdentity,
    ) -> Result<AggregatedResponse, SystemError> {
        self.process_with_cancel(instruction, actor, CancellationToken::new())
            .await
    }

    /// 可取消的处理：取消后不再启动新的子智能体或请求；已发出的请求照常完成并审计，
    /// 随后返回 SystemError::Cancelled
    pub async fn process_with_cancel(
        &self,
        instruction: &str,
        actor: &ActorIdentity,
        cancel: CancellationToken,
    ) -> Result<AggregatedResponse, SystemError> {
        let instruction_id = InstructionId::new();
        let span = tracing::info_span!("instruction", id = %instruction_id, actor = %actor);
        self.run(instruction_id, instruction, actor, &cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        instruction_id: InstructionId,
        instruction: &str,
        actor: &ActorIdentity,
        cancel: &CancellationToken,
    ) -> Result<AggregatedResponse, SystemError> {
        let intent = match self.classify(instruction).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::info!(error = %e, "classification failed, nothing executed");
                return Ok(AggregatedResponse::classification_failed(
                    instruction_id,
                    e.to_string(),
                ));
            }
        };

        if cancel.is_cancelled() {
            tracing::info!("cancelled before fan-out");
            return Err(SystemError::Cancelled);
        }

        let targets = intent.target_integrations().to_vec();
        tracing::info!(
            targets = ?targets,
            hint = %intent.action_hint(),
            confidence = intent.confidence(),
            "fan-out to {} sub-agent(s)",
            targets.len()
        );

        let invocation = Invocation {
            instruction_id,
            instruction,
            intent: &intent,
            actor,
            cancel,
        };
        // join_all 而非 try_join_all：任何集成出错都不能丢下其他已发出的请求
        let outcomes = join_all(
            targets
                .iter()
                .map(|&id| self.run_integration(id, &invocation)),
        )
        .await;

        let mut results = Vec::new();
        let mut audit_error = None;
        for outcome in outcomes {
            results.extend(outcome.results);
            if audit_error.is_none() {
                audit_error = outcome.audit_error;
            }
        }

        if let Some(e) = audit_error {
            tracing::error!(error = %e, "audit append failed, instruction must be retried");
            return Err(SystemError::Audit(e));
        }
        if cancel.is_cancelled() {
            tracing::info!(audited = results.len(), "request cancelled after in-flight actions completed");
            return Err(SystemError::Cancelled);
        }

        let response = AggregatedResponse::from_results(instruction_id, results);
        tracing::info!(
            status = ?response.overall_status,
            results = response.results.len(),
            "instruction processed"
        );
        Ok(response)
    }

    /// 分类并检查置信度；只有 ProviderUnavailable 会重试
    async fn classify(&self, instruction: &str) -> Result<ClassifiedIntent, ClassificationError> {
        let (result, attempts) = self
            .retry
            .run(
                || self.classifier.classify(instruction),
                ClassificationError::is_retryable,
            )
            .await;
        if attempts > 1 {
            tracing::info!(attempts, ok = result.is_ok(), "classification retried");
        }

        let intent = result?;
        if intent.confidence() < self.confidence_threshold {
            return Err(ClassificationError::LowConfidence {
                confidence: intent.confidence(),
                threshold: self.confidence_threshold,
            });
        }
        Ok(intent)
    }

    async fn run_integration(&self, id: IntegrationId, inv: &Invocation<'_>) -> IntegrationOutcome {
        let mut outcome = IntegrationOutcome {
            results: Vec::new(),
            audit_error: None,
        };

        if inv.cancel.is_cancelled() {
            tracing::info!(integration = %id, "cancelled, sub-agent not started");
            return outcome;
        }

        let dispatched = match self.agents.get(id) {
            Some(agent) => {
                let ctx = DispatchContext {
                    dispatcher: &self.dispatcher,
                    actor: inv.actor,
                    cancel: inv.cancel,
                };
                agent.handle(inv.instruction, inv.intent, &ctx).await
            }
            None => {
                tracing::warn!(integration = %id, "no sub-agent registered");
                vec![Dispatched {
                    request: ActionRequest::new(id, inv.intent.action_hint()),
                    result: ActionResult::failure(
                        ErrorKind::Unknown,
                        format!("no sub-agent registered for {id}"),
                    ),
                }]
            }
        };
        tracing::debug!(integration = %id, requests = dispatched.len(), "sub-agent returned");

        for first in dispatched {
            let (dispatched, attempts) = self.retry_failed(first, inv).await;
            let entry = AuditEntry::new(inv.instruction_id, inv.actor.clone(), &dispatched, attempts);

            // 先写审计再放入响应；写失败后继续尝试审计本集成其余已执行的动作
            match self.audit.append(entry).await {
                Ok(()) => outcome.results.push(IntegrationResult {
                    integration: id,
                    operation: dispatched.request.operation,
                    result: dispatched.result,
                }),
                Err(e) => {
                    if outcome.audit_error.is_none() {
                        outcome.audit_error = Some(e);
                    }
                }
            }
        }
        outcome
    }

    /// 只重放失败的那个请求；返回最终结果与总执行次数
    async fn retry_failed(&self, mut dispatched: Dispatched, inv: &Invocation<'_>) -> (Dispatched, u32) {
        let mut attempts = 1u32;
        while dispatched.result.is_retryable() && attempts <= self.retry.max_retries {
            if inv.cancel.is_cancelled() {
                tracing::info!(operation = %dispatched.request.operation, "cancelled, not retrying");
                break;
            }
            let delay = self.retry.delay_for(attempts - 1);
            tracing::info!(
                integration = %dispatched.request.integration,
                operation = %dispatched.request.operation,
                kind = ?dispatched.result.error_kind(),
                delay_ms = delay.as_millis() as u64,
                "retrying failed action"
            );
            tokio::time::sleep(delay).await;
            dispatched.result = self.dispatcher.dispatch(&dispatched.request, inv.actor).await;
            attempts += 1;
        }
        (dispatched, attempts)
    }
}
