//! 工单子智能体：创建工单、评论已有工单、搜索
//!
//! 创建工单时若配置了撰写器，由 LLM 从请求中提炼标题与描述。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{any_word, find_issue_key, recall, words, Composer, SubAgent};
use crate::core::types::{ActionRequest, ClassifiedIntent, IntegrationId};
use crate::memory::SemanticMemory;

pub struct IssueTrackerAgent {
    default_project: String,
    memory: Option<Arc<dyn SemanticMemory>>,
    recall_k: usize,
    composer: Option<Composer>,
}

impl IssueTrackerAgent {
    pub fn new(default_project: impl Into<String>) -> Self {
        Self {
            default_project: default_project.into(),
            memory: None,
            recall_k: 3,
            composer: None,
        }
    }

    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = Some(composer);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn SemanticMemory>, recall_k: usize) -> Self {
        self.memory = Some(memory);
        self.recall_k = recall_k;
        self
    }
}

#[async_trait]
impl SubAgent for IssueTrackerAgent {
    fn integration(&self) -> IntegrationId {
        IntegrationId::IssueTracker
    }

    async fn plan(&self, instruction: &str, intent: &ClassifiedIntent) -> Vec<ActionRequest> {
        let w = words(instruction, intent);
        let recalled = recall(self.memory.as_ref(), instruction, self.recall_k).await;
        let searching = any_word(&w, &["search", "find", "list", "show", "which"]);

        let request = match find_issue_key(instruction) {
            Some(key) if !searching => ActionRequest::new(IntegrationId::IssueTracker, "add_comment")
                .with_param("issue_key", key)
                .with_param("body", instruction),
            _ if !searching
                && any_word(&w, &["create", "file", "report", "raise", "bug", "new"]) =>
            {
                let project = recalled
                    .metadata("project_key")
                    .map(String::from)
                    .unwrap_or_else(|| self.default_project.clone());
                let issue_type = if w.contains("bug") { "Bug" } else { "Task" };
                let draft = match &self.composer {
                    Some(composer) => {
                        composer
                            .draft_issue(instruction, issue_type, &recalled.texts())
                            .await
                    }
                    None => None,
                };
                let request = ActionRequest::new(IntegrationId::IssueTracker, "create_issue")
                    .with_param("project_key", project)
                    .with_param("issue_type", issue_type);
                match draft {
                    Some(d) if !d.description.trim().is_empty() => request
                        .with_param("summary", d.summary.trim())
                        .with_param("description", d.description),
                    Some(d) => request.with_param("summary", d.summary.trim()),
                    None => request.with_param("summary", instruction),
                }
            }
            _ => {
                let project = recalled
                    .metadata("project_key")
                    .map(String::from)
                    .unwrap_or_else(|| self.default_project.clone());
                ActionRequest::new(IntegrationId::IssueTracker, "search_issues")
                    .with_param("jql", format!("project = {project} AND statusCategory != Done"))
                    .with_param("text", instruction)
            }
        };

        let request = match recalled.context() {
            Some(context) => request.with_param("context", context),
            None => request,
        };
        vec![request]
    }
}
