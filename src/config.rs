//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SWITCHBOARD__*` 覆盖
//! （双下划线表示嵌套，如 `SWITCHBOARD__ORCHESTRATOR__CONFIDENCE_THRESHOLD=0.7`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::types::IntegrationId;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub audit: AuditSection,
    pub memory: MemorySection,
    pub integrations: IntegrationsSection,
    pub server: ServerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：意图分类所用的后端
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    /// 子智能体用 LLM 撰写邮件正文、工单标题与频道消息（需要真实后端）
    #[serde(default = "default_compose")]
    pub compose: bool,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
            compose: default_compose(),
        }
    }
}

fn default_compose() -> bool {
    true
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [orchestrator] 段：置信度阈值、执行器超时、重试
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 单次外部动作超时（秒）
    #[serde(default = "default_executor_timeout_secs")]
    pub executor_timeout_secs: u64,
    /// 关键词快速分类（命中时不调用 LLM）
    #[serde(default = "default_true")]
    pub enable_fast_match: bool,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            executor_timeout_secs: default_executor_timeout_secs(),
            enable_fast_match: true,
            retry: RetrySection::default(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_executor_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// [orchestrator.retry] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_factor() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    1
}

/// [audit] 段：file 为 JSON Lines 持久化，memory 仅用于本地调试
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    #[serde(default = "default_audit_backend")]
    pub backend: String,
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            backend: default_audit_backend(),
            path: default_audit_path(),
        }
    }
}

fn default_audit_backend() -> String {
    "file".to_string()
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("logs/audit.jsonl")
}

/// [memory] 段：语义记忆容量、召回条数、可选嵌入模型
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
    /// 设置且有 OPENAI_API_KEY 时使用向量检索，否则退化为词重叠
    pub embedding_model: Option<String>,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            recall_k: default_recall_k(),
            embedding_model: None,
        }
    }
}

fn default_max_entries() -> usize {
    1000
}

fn default_recall_k() -> usize {
    3
}

/// [integrations.*] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IntegrationsSection {
    pub mail: IntegrationSection,
    pub calendar: IntegrationSection,
    pub chat: ChatSection,
    pub issue_tracker: IssueTrackerSection,
}

impl IntegrationsSection {
    pub fn get(&self, id: IntegrationId) -> &IntegrationSection {
        match id {
            IntegrationId::Mail => &self.mail,
            IntegrationId::Calendar => &self.calendar,
            IntegrationId::Chat => &self.chat.common,
            IntegrationId::IssueTracker => &self.issue_tracker.common,
        }
    }
}

/// 单个集成：未配置 base_url 时使用模拟执行器
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub base_url: Option<String>,
    /// 静态 Bearer 令牌
    pub token: Option<String>,
}

impl Default for IntegrationSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSection {
    #[serde(flatten)]
    pub common: IntegrationSection,
    #[serde(default = "default_channel")]
    pub default_channel: String,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            common: IntegrationSection::default(),
            default_channel: default_channel(),
        }
    }
}

fn default_channel() -> String {
    "#general".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueTrackerSection {
    #[serde(flatten)]
    pub common: IntegrationSection,
    #[serde(default = "default_project")]
    pub default_project: String,
}

impl Default for IssueTrackerSection {
    fn default() -> Self {
        Self {
            common: IntegrationSection::default(),
            default_project: default_project(),
        }
    }
}

fn default_project() -> String {
    "OPS".to_string()
}

/// [server] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

/// 从 config 目录加载配置，环境变量 SWITCHBOARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SWITCHBOARD__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SWITCHBOARD")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.confidence_threshold, 0.5);
        assert_eq!(cfg.orchestrator.executor_timeout_secs, 30);
        assert_eq!(cfg.orchestrator.retry.base_delay_ms, 500);
        assert_eq!(cfg.orchestrator.retry.max_retries, 1);
        assert_eq!(cfg.integrations.chat.default_channel, "#general");
        assert!(cfg.integrations.get(IntegrationId::IssueTracker).enabled);
        assert!(cfg.llm.compose);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r##"
[orchestrator]
confidence_threshold = 0.7

[orchestrator.retry]
base_delay_ms = 10

[integrations.chat]
base_url = "http://chat.local"
default_channel = "#ops"

[audit]
backend = "memory"
"##
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert!((cfg.orchestrator.confidence_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.orchestrator.retry.base_delay_ms, 10);
        assert_eq!(cfg.orchestrator.retry.max_retries, 1);
        assert_eq!(cfg.integrations.chat.default_channel, "#ops");
        assert_eq!(
            cfg.integrations.get(IntegrationId::Chat).base_url.as_deref(),
            Some("http://chat.local")
        );
        assert_eq!(cfg.audit.backend, "memory");
    }
}
