//! HTTP 执行器：把动作转发到集成服务（或其适配网关）
//!
//! 约定：POST {base_url}/{operation}，Body 为参数 JSON，Authorization: Bearer <token>；
//! 返回 JSON 对象作为载荷，非对象值包装为 {"result": ...}。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::core::types::Parameters;
use crate::integrations::{ActionExecutor, ExecutorError, Token};

pub struct HttpActionExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpActionExecutor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::Other(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation)
    }
}

/// 状态码归类
fn error_for_status(status: StatusCode, body: &str) -> ExecutorError {
    let detail = if body.chars().count() > 300 {
        format!("{status}: {}...", body.chars().take(300).collect::<String>())
    } else {
        format!("{status}: {body}")
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExecutorError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => ExecutorError::RateLimited(detail),
        StatusCode::NOT_FOUND => ExecutorError::NotFound(detail),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ExecutorError::InvalidArgument(detail)
        }
        s if s.is_server_error() => ExecutorError::Unavailable(detail),
        _ => ExecutorError::Other(detail),
    }
}

fn into_payload(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        Value::Null => Parameters::new(),
        other => {
            let mut map = Parameters::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

#[async_trait]
impl ActionExecutor for HttpActionExecutor {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn execute(
        &self,
        operation: &str,
        parameters: &Parameters,
        token: &Token,
    ) -> Result<Parameters, ExecutorError> {
        let response = self
            .client
            .post(self.endpoint(operation))
            .bearer_auth(token.secret())
            .json(parameters)
            .send()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutorError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(error_for_status(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Parameters::new());
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ExecutorError::Other(format!("invalid JSON from provider: {e}")))?;
        Ok(into_payload(value))
    }
}
