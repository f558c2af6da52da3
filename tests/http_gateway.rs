//! HTTP 入口测试：状态码映射、身份头、语义记忆与集成状态接口

#![cfg(feature = "server")]

mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use switchboard::audit::{AuditLog, InMemoryAuditLog};
    use switchboard::gateway::{router, AppState, ACTOR_HEADER};
    use switchboard::integrations::ExecutorError;
    use switchboard::llm::MockLlmClient;
    use tower::ServiceExt;

    use crate::common::{build_hub, test_config, Executors, FailingAudit, Scripted};

    async fn app(executors: &Executors, audit: Arc<dyn AuditLog>) -> Router {
        let hub = build_hub(executors, audit, MockLlmClient::new()).await;
        router(Arc::new(AppState::new(test_config(), hub)))
    }

    fn post(uri: &str, actor: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn instruction(text: &str) -> Value {
        json!({ "instruction": text })
    }

    #[tokio::test]
    async fn test_all_succeeded_is_200() {
        let app = app(&Executors::default(), Arc::new(InMemoryAuditLog::new())).await;
        let (status, body) = send(
            app,
            post("/api/v1/instructions", Some("alice"), instruction("what meetings do I have today")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overall_status"], "all_succeeded");
        assert_eq!(body["results"][0]["integration"], "calendar");
        assert_eq!(body["results"][0]["result"]["status"], "success");
    }

    #[tokio::test]
    async fn test_partial_failure_is_207() {
        let executors = Executors {
            chat: Scripted::always(ExecutorError::RateLimited("429".into())),
            ..Default::default()
        };
        let app = app(&executors, Arc::new(InMemoryAuditLog::new())).await;
        let (status, body) = send(
            app,
            post(
                "/api/v1/instructions",
                Some("alice"),
                instruction("reschedule my 3pm meeting and tell #team"),
            ),
        )
        .await;
        assert_eq!(status.as_u16(), 207);
        assert_eq!(body["results"][1]["result"]["kind"], "rate_limited");
        assert_eq!(body["results"][1]["result"]["retryable"], true);
    }

    #[tokio::test]
    async fn test_all_failed_is_502() {
        let executors = Executors {
            calendar: Scripted::always(ExecutorError::Unauthorized("revoked".into())),
            ..Default::default()
        };
        let app = app(&executors, Arc::new(InMemoryAuditLog::new())).await;
        let (status, body) = send(
            app,
            post("/api/v1/instructions", Some("alice"), instruction("what meetings do I have today")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["results"][0]["result"]["kind"], "auth_expired");
    }

    #[tokio::test]
    async fn test_classification_failed_is_422() {
        let app = app(&Executors::default(), Arc::new(InMemoryAuditLog::new())).await;
        let (status, body) = send(
            app,
            post("/api/v1/instructions", Some("alice"), instruction("   ")),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["overall_status"], "classification_failed");
        assert!(body["detail"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_missing_actor_is_401() {
        let audit = InMemoryAuditLog::new();
        let executors = Executors::default();
        let app = app(&executors, Arc::new(audit.clone())).await;
        let (status, _) = send(
            app,
            post("/api/v1/instructions", None, instruction("what meetings do I have today")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(executors.calendar.calls(), 0);
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn test_audit_failure_is_503_with_retry() {
        let app = app(&Executors::default(), FailingAudit::after(0)).await;
        let (status, body) = send(
            app,
            post("/api/v1/instructions", Some("alice"), instruction("what meetings do I have today")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retry"], true);
        assert!(body.get("overall_status").is_none());
    }

    #[tokio::test]
    async fn test_memory_remember_then_search() {
        let app = app(&Executors::default(), Arc::new(InMemoryAuditLog::new())).await;
        let (status, body) = send(
            app.clone(),
            post(
                "/api/v1/memory/documents",
                None,
                json!({ "text": "release notes go to #releases", "metadata": { "channel": "#releases" } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["id"].is_string());

        let (status, body) = send(
            app.clone(),
            post("/api/v1/memory/search", None, json!({ "query": "release notes", "k": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["metadata"]["channel"], "#releases");

        let (status, _) = send(
            app,
            post("/api/v1/memory/documents", None, json!({ "text": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_integrations_and_health() {
        let app = app(&Executors::default(), Arc::new(InMemoryAuditLog::new())).await;
        let req = Request::builder()
            .uri("/api/v1/integrations")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 4);
        assert_eq!(body[0]["integration"], "mail");
        assert_eq!(body[0]["enabled"], true);
        assert_eq!(body[0]["executor"], "scripted");

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
