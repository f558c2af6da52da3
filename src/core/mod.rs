//! 核心编排层：数据模型、错误分类、意图分类、重试、编排器、装配与关闭

pub mod builder;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod retry;
pub mod shutdown;
pub mod types;

pub use builder::{llm_backend_from_config, Hub, HubBuilder};
pub use error::{AuditError, ClassificationError, ErrorKind, SystemError};
pub use intent::{IntentClassifier, LlmIntentClassifier};
pub use orchestrator::Orchestrator;
pub use retry::RetryPolicy;
pub use shutdown::{
    AuditLogCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager, ShutdownReason,
};
pub use types::{
    ActionRequest, ActionResult, ActorIdentity, AggregatedResponse, AuditEntry, ClassifiedIntent,
    Dispatched, InstructionId, IntegrationId, IntegrationResult, OverallStatus, Parameters,
};
