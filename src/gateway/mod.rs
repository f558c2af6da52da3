//! 入站 HTTP 层（axum）
//!
//! - POST /api/v1/instructions：提交指令，调用者身份来自 `X-Actor-Id`
//! - POST /api/v1/memory/documents、/api/v1/memory/search：语义记忆
//! - GET  /api/v1/integrations：各集成启用状态与执行器类型
//! - GET  /health

pub mod routes;

pub use routes::{router, status_for, AppState, ACTOR_HEADER};
