//! 动作分发器
//!
//! 持有执行器注册表、凭据提供方与全局超时；dispatch(request) 先取令牌，再在超时内调用执行器，
//! 任何失败都收敛为 ActionResult::Failure（从不向上抛出）；每次调用输出结构化日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::error::ErrorKind;
use crate::core::types::{ActionRequest, ActionResult, ActorIdentity, IntegrationId};
use crate::integrations::{CredentialProvider, ExecutorRegistry};

pub struct ActionDispatcher {
    registry: ExecutorRegistry,
    credentials: Arc<dyn CredentialProvider>,
    timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(
        registry: ExecutorRegistry,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            credentials,
            timeout,
        }
    }

    /// 执行单个动作请求；超时视为 ProviderUnavailable，凭据失败视为 AuthExpired
    pub async fn dispatch(&self, request: &ActionRequest, actor: &ActorIdentity) -> ActionResult {
        let start = Instant::now();
        let result = self.dispatch_inner(request, actor).await;

        let outcome = match &result {
            ActionResult::Success { .. } => "ok",
            ActionResult::Failure { kind, .. } => match kind {
                ErrorKind::ProviderUnavailable => "unavailable",
                ErrorKind::RateLimited => "rate_limited",
                ErrorKind::AuthExpired => "auth_expired",
                _ => "error",
            },
        };
        let record = serde_json::json!({
            "event": "action_dispatch",
            "integration": request.integration.as_str(),
            "operation": request.operation,
            "actor": actor.as_str(),
            "ok": result.is_success(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "params_preview": params_preview(request),
        });
        tracing::info!(dispatch = %record.to_string(), "action");

        result
    }

    async fn dispatch_inner(&self, request: &ActionRequest, actor: &ActorIdentity) -> ActionResult {
        let Some(executor) = self.registry.get(request.integration) else {
            return ActionResult::failure(
                ErrorKind::Unknown,
                format!("integration '{}' is not configured", request.integration),
            );
        };

        let token = match self
            .credentials
            .get_bearer_token(actor, request.integration.scope())
            .await
        {
            Ok(token) => token,
            Err(e) => return ActionResult::failure(ErrorKind::AuthExpired, e.to_string()),
        };

        match timeout(
            self.timeout,
            executor.execute(&request.operation, &request.parameters, &token),
        )
        .await
        {
            Ok(Ok(payload)) => ActionResult::success(payload),
            Ok(Err(e)) => ActionResult::failure(e.kind(), e.to_string()),
            Err(_) => ActionResult::failure(
                ErrorKind::ProviderUnavailable,
                format!(
                    "{} timed out after {}s",
                    request.operation,
                    self.timeout.as_secs_f32()
                ),
            ),
        }
    }

    pub fn executors(&self) -> Vec<(IntegrationId, &'static str)> {
        self.registry.describe()
    }
}

fn params_preview(request: &ActionRequest) -> String {
    let s = serde_json::Value::Object(request.parameters.clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
