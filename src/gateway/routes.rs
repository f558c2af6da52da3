//! 路由与处理函数

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::AppConfig;
use crate::core::{ActorIdentity, Hub, IntegrationId, OverallStatus, SystemError};
use crate::memory::{MemoryError, Metadata, Recollection};

/// 由上游认证层写入的调用者身份头
pub const ACTOR_HEADER: &str = "x-actor-id";

/// search 未给出 k 时的默认条数
const DEFAULT_SEARCH_K: usize = 5;

pub struct AppState {
    pub config: AppConfig,
    pub hub: Hub,
    /// 指令处理任务在此派生，关闭时等待其完成
    tasks: TaskTracker,
}

impl AppState {
    pub fn new(config: AppConfig, hub: Hub) -> Self {
        Self {
            config,
            hub,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_tracker(mut self, tasks: TaskTracker) -> Self {
        self.tasks = tasks;
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/instructions", post(api_instructions))
        .route("/api/v1/integrations", get(api_integrations))
        .route("/api/v1/memory/documents", post(api_memory_remember))
        .route("/api/v1/memory/search", post(api_memory_search))
        .with_state(state)
}

/// 整体状态到 HTTP 状态码
pub fn status_for(status: OverallStatus) -> StatusCode {
    match status {
        OverallStatus::AllSucceeded => StatusCode::OK,
        OverallStatus::PartialFailure => StatusCode::MULTI_STATUS,
        OverallStatus::AllFailed => StatusCode::BAD_GATEWAY,
        OverallStatus::ClassificationFailed => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct InstructionRequest {
    instruction: String,
}

fn actor_from(headers: &HeaderMap) -> Option<ActorIdentity> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ActorIdentity::new)
}

/// POST /api/v1/instructions
///
/// 指令在独立任务中处理：客户端断开时 drop guard 取消令牌，不再启动新的子智能体，
/// 已发出的动作仍在后台完成并审计。
async fn api_instructions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<InstructionRequest>,
) -> Response {
    let Some(actor) = actor_from(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": format!("missing {ACTOR_HEADER} header") })),
        )
            .into_response();
    };

    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let orchestrator = state.hub.orchestrator.clone();
    let task = state.tasks.spawn(async move {
        orchestrator
            .process_with_cancel(&req.instruction, &actor, cancel)
            .await
    });
    let joined = task.await;
    let _ = guard.disarm();

    match joined {
        Ok(Ok(response)) => (status_for(response.overall_status), Json(response)).into_response(),
        Ok(Err(e)) => {
            let retry = matches!(e, SystemError::Audit(_) | SystemError::Cancelled);
            tracing::error!(error = %e, "instruction aborted");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string(), "retry": retry })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "instruction task panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal error", "retry": true })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct IntegrationInfo {
    integration: IntegrationId,
    enabled: bool,
    executor: Option<&'static str>,
}

/// GET /api/v1/integrations
async fn api_integrations(State(state): State<Arc<AppState>>) -> Json<Vec<IntegrationInfo>> {
    let executors = state.hub.orchestrator.dispatcher().executors();
    let list = IntegrationId::ALL
        .into_iter()
        .map(|id| IntegrationInfo {
            integration: id,
            enabled: state.config.integrations.get(id).enabled,
            executor: executors
                .iter()
                .find(|(e, _)| *e == id)
                .map(|(_, kind)| *kind),
        })
        .collect();
    Json(list)
}

#[derive(Debug, Deserialize)]
struct RememberRequest {
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

fn memory_error(e: MemoryError) -> (StatusCode, String) {
    match e {
        MemoryError::EmptyText => (StatusCode::BAD_REQUEST, e.to_string()),
        MemoryError::Embedding(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

/// POST /api/v1/memory/documents
async fn api_memory_remember(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RememberRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let id = state
        .hub
        .memory
        .remember(&req.text, req.metadata)
        .await
        .map_err(memory_error)?;
    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    k: Option<usize>,
}

/// POST /api/v1/memory/search
async fn api_memory_search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<Recollection>>, (StatusCode, String)> {
    let hits = state
        .hub
        .memory
        .recall(&req.query, req.k.unwrap_or(DEFAULT_SEARCH_K))
        .await
        .map_err(memory_error)?;
    Ok(Json(hits))
}
