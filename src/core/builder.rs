//! 构建器：进程启动时从 AppConfig 一次性装配编排器及其依赖
//!
//! HTTP 服务与命令行共用同一套装配逻辑；测试可用 with_* 替换任意组件。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::agents::{
    AgentRegistry, CalendarAgent, ChatAgent, Composer, IssueTrackerAgent, MailAgent,
};
use crate::audit::{AuditLog, InMemoryAuditLog, JsonlAuditLog};
use crate::config::AppConfig;
use crate::core::intent::{IntentClassifier, LlmIntentClassifier};
use crate::core::orchestrator::Orchestrator;
use crate::core::retry::RetryPolicy;
use crate::core::types::IntegrationId;
use crate::integrations::{
    ActionDispatcher, CredentialProvider, ExecutorRegistry, HttpActionExecutor, SimulatedExecutor,
    StaticCredentials,
};
use crate::llm::{
    create_deepseek_client, create_embedder_from_config, LlmClient, MockLlmClient, OpenAiClient,
};
use crate::memory::{EmbeddingSemanticMemory, InMemorySemanticMemory, SemanticMemory};

/// 模拟执行器不校验令牌，未配置令牌时用占位值
const SIMULATED_TOKEN: &str = "simulated";

/// 根据配置与环境变量选择真实 LLM 后端（DeepSeek / OpenAI 兼容）；没有 API Key 时返回 None
pub fn llm_backend_from_config(cfg: &AppConfig) -> Option<Arc<dyn LlmClient>> {
    let provider = cfg.llm.provider.to_lowercase();
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        Some(Arc::new(create_deepseek_client(Some(&cfg.llm.model))))
    } else if use_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        Some(Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        )))
    } else {
        None
    }
}

/// 装配完成的运行时组件
#[derive(Clone)]
pub struct Hub {
    pub orchestrator: Arc<Orchestrator>,
    pub memory: Arc<dyn SemanticMemory>,
    pub audit: Arc<dyn AuditLog>,
}

pub struct HubBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    classifier: Option<Arc<dyn IntentClassifier>>,
    audit: Option<Arc<dyn AuditLog>>,
    memory: Option<Arc<dyn SemanticMemory>>,
    executors: Option<ExecutorRegistry>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl HubBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            classifier: None,
            audit: None,
            memory: None,
            executors: None,
            credentials: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn SemanticMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_executors(mut self, executors: ExecutorRegistry) -> Self {
        self.executors = Some(executors);
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// 已启用的集成：配置了 base_url 用 HTTP 执行器，否则用模拟执行器
    pub fn build_executor_registry(&self) -> anyhow::Result<ExecutorRegistry> {
        let timeout = Duration::from_secs(self.config.orchestrator.executor_timeout_secs);
        let mut registry = ExecutorRegistry::new();
        for id in IntegrationId::ALL {
            let section = self.config.integrations.get(id);
            if !section.enabled {
                tracing::info!(integration = %id, "integration disabled");
                continue;
            }
            match section.base_url.as_deref() {
                Some(url) => {
                    let executor = HttpActionExecutor::new(url, timeout)
                        .with_context(|| format!("failed to build HTTP executor for {id}"))?;
                    registry.register(id, executor);
                }
                None => registry.register(id, SimulatedExecutor::new(id)),
            }
        }
        Ok(registry)
    }

    fn build_credentials(&self) -> StaticCredentials {
        IntegrationId::ALL
            .into_iter()
            .fold(StaticCredentials::new(), |creds, id| {
                let section = self.config.integrations.get(id);
                match (&section.token, &section.base_url) {
                    (Some(token), _) => creds.with_token(id, token.clone()),
                    (None, None) => creds.with_token(id, SIMULATED_TOKEN),
                    // 真实集成没有令牌：保持缺失，调用时报 AuthExpired
                    (None, Some(_)) => creds,
                }
            })
    }

    async fn build_audit(&self) -> anyhow::Result<Arc<dyn AuditLog>> {
        match self.config.audit.backend.as_str() {
            "memory" => {
                tracing::warn!("Audit backend is in-memory, entries are lost on exit");
                Ok(Arc::new(InMemoryAuditLog::new()))
            }
            other => {
                if other != "file" {
                    tracing::warn!("Unknown audit backend '{}', using file", other);
                }
                let log = JsonlAuditLog::open(&self.config.audit.path)
                    .await
                    .with_context(|| {
                        format!("failed to open audit log {}", self.config.audit.path.display())
                    })?;
                tracing::info!("Audit log: {}", self.config.audit.path.display());
                Ok(Arc::new(log))
            }
        }
    }

    fn build_memory(&self) -> Arc<dyn SemanticMemory> {
        let cfg = &self.config.memory;
        match create_embedder_from_config(
            self.config.llm.base_url.as_deref(),
            cfg.embedding_model.as_deref(),
        ) {
            Some(embedder) => {
                tracing::info!("Semantic memory: embeddings");
                Arc::new(EmbeddingSemanticMemory::new(embedder, cfg.max_entries))
            }
            None => {
                tracing::info!("Semantic memory: lexical");
                Arc::new(InMemorySemanticMemory::new(cfg.max_entries))
            }
        }
    }

    /// 撰写器：关闭 compose 或只有 Mock 后端时为 None
    fn build_composer(&self, backend: Option<Arc<dyn LlmClient>>) -> Option<Composer> {
        if !self.config.llm.compose {
            return None;
        }
        match backend {
            Some(llm) => Some(
                Composer::new(llm)
                    .with_timeout(Duration::from_secs(self.config.llm.timeouts.request)),
            ),
            None => {
                tracing::info!("No LLM backend, sub-agents use instruction text as content");
                None
            }
        }
    }

    fn build_agents(
        &self,
        memory: &Arc<dyn SemanticMemory>,
        composer: Option<Composer>,
    ) -> AgentRegistry {
        let k = self.config.memory.recall_k;
        let integrations = &self.config.integrations;

        let mut mail = MailAgent::new().with_memory(memory.clone(), k);
        let mut chat =
            ChatAgent::new(integrations.chat.default_channel.clone()).with_memory(memory.clone(), k);
        let mut issues = IssueTrackerAgent::new(integrations.issue_tracker.default_project.clone())
            .with_memory(memory.clone(), k);
        if let Some(composer) = composer {
            mail = mail.with_composer(composer.clone());
            chat = chat.with_composer(composer.clone());
            issues = issues.with_composer(composer);
        }

        let mut agents = AgentRegistry::new();
        agents.register(mail);
        agents.register(CalendarAgent::new().with_memory(memory.clone(), k));
        agents.register(chat);
        agents.register(issues);
        agents
    }

    pub async fn build(self) -> anyhow::Result<Hub> {
        let orch_cfg = &self.config.orchestrator;
        let backend = self
            .llm
            .clone()
            .or_else(|| llm_backend_from_config(&self.config));

        let classifier = match &self.classifier {
            Some(c) => c.clone(),
            None => {
                let llm = backend.clone().unwrap_or_else(|| {
                    tracing::warn!(
                        "No API key set or provider unknown, using Mock LLM (keyword routing only)"
                    );
                    Arc::new(MockLlmClient::new())
                });
                Arc::new(
                    LlmIntentClassifier::new(llm)
                        .with_fast_match(orch_cfg.enable_fast_match)
                        .with_request_timeout(Duration::from_secs(self.config.llm.timeouts.request)),
                )
            }
        };

        let executors = match &self.executors {
            Some(r) => r.clone(),
            None => self.build_executor_registry()?,
        };
        let credentials = match &self.credentials {
            Some(c) => c.clone(),
            None => Arc::new(self.build_credentials()),
        };
        let audit = match &self.audit {
            Some(a) => a.clone(),
            None => self.build_audit().await?,
        };
        let memory = match &self.memory {
            Some(m) => m.clone(),
            None => self.build_memory(),
        };

        let dispatcher = ActionDispatcher::new(
            executors,
            credentials,
            Duration::from_secs(orch_cfg.executor_timeout_secs),
        );
        let orchestrator = Orchestrator::new(
            classifier,
            self.build_agents(&memory, self.build_composer(backend)),
            Arc::new(dispatcher),
            audit.clone(),
        )
        .with_confidence_threshold(orch_cfg.confidence_threshold)
        .with_retry_policy(RetryPolicy::from_config(&orch_cfg.retry));

        Ok(Hub {
            orchestrator: Arc::new(orchestrator),
            memory,
            audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_executor_registry_skips_disabled() {
        let mut cfg = AppConfig::default();
        cfg.integrations.mail.enabled = false;
        cfg.integrations.chat.common.base_url = Some("http://chat.local".into());
        let registry = HubBuilder::new(cfg).build_executor_registry().unwrap();
        let described = registry.describe();
        assert!(registry.get(IntegrationId::Mail).is_none());
        assert!(described.contains(&(IntegrationId::Chat, "http")));
        assert!(described.contains(&(IntegrationId::Calendar, "simulated")));
    }

    #[tokio::test]
    async fn test_build_with_memory_audit() {
        let mut cfg = AppConfig::default();
        cfg.audit.backend = "memory".into();
        let hub = HubBuilder::new(cfg)
            .with_llm(Arc::new(MockLlmClient::new()))
            .build()
            .await
            .unwrap();
        assert_eq!(hub.orchestrator.agents().len(), 4);
        assert_eq!(hub.orchestrator.dispatcher().executors().len(), 4);
    }

    #[test]
    fn test_composer_requires_backend_and_flag() {
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new());

        let builder = HubBuilder::new(AppConfig::default());
        assert!(builder.build_composer(Some(llm.clone())).is_some());
        assert!(builder.build_composer(None).is_none());

        let mut cfg = AppConfig::default();
        cfg.llm.compose = false;
        assert!(HubBuilder::new(cfg).build_composer(Some(llm)).is_none());
    }
}
