//! 日历子智能体
//!
//! 词义决定操作：改期 -> update_event，找空档 -> propose_slots，安排 -> create_event，
//! 其余一律 list_events（只读，最安全）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::agents::{any_word, find_time, recall, words, SubAgent};
use crate::core::types::{ActionRequest, ClassifiedIntent, IntegrationId};
use crate::memory::SemanticMemory;

const DEFAULT_DURATION_MINUTES: u64 = 30;
const WORKDAY_START_HOUR: u64 = 9;
const WORKDAY_END_HOUR: u64 = 17;

pub struct CalendarAgent {
    memory: Option<Arc<dyn SemanticMemory>>,
    recall_k: usize,
}

impl CalendarAgent {
    pub fn new() -> Self {
        Self {
            memory: None,
            recall_k: 3,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn SemanticMemory>, recall_k: usize) -> Self {
        self.memory = Some(memory);
        self.recall_k = recall_k;
        self
    }
}

impl Default for CalendarAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// 查询的时间范围
fn range_of(w: &std::collections::HashSet<String>) -> &'static str {
    if w.contains("tomorrow") {
        "tomorrow"
    } else if any_word(w, &["week", "weekly"]) {
        "week"
    } else {
        "today"
    }
}

#[async_trait]
impl SubAgent for CalendarAgent {
    fn integration(&self) -> IntegrationId {
        IntegrationId::Calendar
    }

    async fn plan(&self, instruction: &str, intent: &ClassifiedIntent) -> Vec<ActionRequest> {
        let w = words(instruction, intent);
        let time = find_time(instruction);
        let range = range_of(&w);

        let request = if any_word(&w, &["reschedule", "move", "postpone", "push"]) {
            let mut r = ActionRequest::new(IntegrationId::Calendar, "update_event")
                .with_param("query", instruction)
                .with_param("range", range);
            if let Some(t) = time {
                r = r.with_param("original_time", t);
            }
            r
        } else if any_word(&w, &["free", "slot", "slots", "available", "availability", "propose"]) {
            ActionRequest::new(IntegrationId::Calendar, "propose_slots")
                .with_param("duration_minutes", DEFAULT_DURATION_MINUTES)
                .with_param(
                    "working_hours",
                    json!({ "start": WORKDAY_START_HOUR, "end": WORKDAY_END_HOUR }),
                )
                .with_param("range", range)
        } else if any_word(&w, &["schedule", "book", "create", "add", "set"]) {
            let mut r = ActionRequest::new(IntegrationId::Calendar, "create_event")
                .with_param("summary", instruction)
                .with_param("duration_minutes", DEFAULT_DURATION_MINUTES)
                .with_param("range", range);
            if let Some(t) = time {
                r = r.with_param("start_time", t);
            }
            r
        } else {
            ActionRequest::new(IntegrationId::Calendar, "list_events").with_param("range", range)
        };

        let recalled = recall(self.memory.as_ref(), instruction, self.recall_k).await;
        let request = match recalled.context() {
            Some(context) => request.with_param("context", context),
            None => request,
        };
        vec![request]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn plan_for(instruction: &str, hint: &str) -> Vec<ActionRequest> {
        let intent = ClassifiedIntent::new([IntegrationId::Calendar], hint, 0.9);
        CalendarAgent::new().plan(instruction, &intent).await
    }

    #[tokio::test]
    async fn test_meetings_today_lists_events() {
        let plan = plan_for("what meetings do I have today", "meetings").await;
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].operation, "list_events");
        assert_eq!(plan[0].parameters["range"], "today");
    }

    #[tokio::test]
    async fn test_reschedule_updates_event() {
        let plan = plan_for("reschedule my 3pm meeting and tell #team", "reschedule").await;
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].operation, "update_event");
        assert_eq!(plan[0].parameters["original_time"], "3pm");
    }

    #[tokio::test]
    async fn test_free_slots() {
        let plan = plan_for("when am I free tomorrow", "free").await;
        assert_eq!(plan[0].operation, "propose_slots");
        assert_eq!(plan[0].parameters["duration_minutes"], 30);
        assert_eq!(plan[0].parameters["working_hours"]["start"], 9);
        assert_eq!(plan[0].parameters["range"], "tomorrow");
    }

    #[tokio::test]
    async fn test_schedule_creates_event() {
        let plan = plan_for("schedule a sync at 10am tomorrow", "schedule").await;
        assert_eq!(plan[0].operation, "create_event");
        assert_eq!(plan[0].parameters["start_time"], "10am");
    }
}
