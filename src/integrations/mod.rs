//! 外部集成边界：动作执行器、凭据提供方与统一分发器
//!
//! 每个集成（邮件 / 日历 / 聊天 / 工单）对应一个 ActionExecutor；
//! ActionDispatcher 负责取令牌、加超时、把执行器错误归一为 ErrorKind。

pub mod credentials;
pub mod dispatcher;
pub mod executor;
pub mod http;
pub mod simulated;

pub use credentials::{AuthError, CredentialProvider, StaticCredentials, Token};
pub use dispatcher::ActionDispatcher;
pub use executor::{ActionExecutor, ExecutorError, ExecutorRegistry};
pub use http::HttpActionExecutor;
pub use simulated::SimulatedExecutor;
