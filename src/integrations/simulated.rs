//! 模拟执行器：未配置 base_url 时使用，不产生真实副作用
//!
//! 读操作返回空列表，写操作返回带新 ID 的回执，便于本地跑通整条链路。

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::types::{IntegrationId, Parameters};
use crate::integrations::{ActionExecutor, ExecutorError, Token};

pub struct SimulatedExecutor {
    integration: IntegrationId,
}

impl SimulatedExecutor {
    pub fn new(integration: IntegrationId) -> Self {
        Self { integration }
    }
}

#[async_trait]
impl ActionExecutor for SimulatedExecutor {
    fn kind(&self) -> &'static str {
        "simulated"
    }

    async fn execute(
        &self,
        operation: &str,
        parameters: &Parameters,
        _token: &Token,
    ) -> Result<Parameters, ExecutorError> {
        let mut payload = Parameters::new();
        payload.insert("simulated".into(), Value::Bool(true));
        payload.insert("integration".into(), json!(self.integration.as_str()));
        payload.insert("operation".into(), json!(operation));

        if operation.starts_with("list_") || operation.starts_with("search_") {
            payload.insert("items".into(), json!([]));
        } else if operation == "propose_slots" {
            payload.insert("slots".into(), json!([]));
        } else {
            payload.insert("id".into(), json!(Uuid::new_v4().to_string()));
            payload.insert("echo".into(), Value::Object(parameters.clone()));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_write_returns_id() {
        let exec = SimulatedExecutor::new(IntegrationId::Chat);
        let mut params = Parameters::new();
        params.insert("channel".into(), json!("#team"));
        let payload = exec
            .execute("post_message", &params, &Token::new("t"))
            .await
            .unwrap();
        assert!(payload.contains_key("id"));
        assert_eq!(payload["echo"]["channel"], "#team");
    }

    #[tokio::test]
    async fn test_simulated_read_returns_items() {
        let exec = SimulatedExecutor::new(IntegrationId::Calendar);
        let payload = exec
            .execute("list_events", &Parameters::new(), &Token::new("t"))
            .await
            .unwrap();
        assert_eq!(payload["items"], json!([]));
    }
}
