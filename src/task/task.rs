use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Step, StepStatus};
use crate::agent::AgentAssignment;

/// Average wall time assumed per remaining step when estimating ETA
const AVG_STEP_TIME: Duration = Duration::from_secs(5);

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Executing => "Executing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Request handed over by the host when a task is created
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub request: String,
    pub session_id: String,
    #[serde(default)]
    pub topic_id: Option<String>,
    #[serde(default)]
    pub max_steps: Option<usize>,
    /// Milliseconds. Carried for the host; the core imposes no deadline.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

impl CreateTaskRequest {
    pub fn new(request: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// Progress summary for display
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub percentage: u8,
    pub current_step: String,
    pub eta: Duration,
}

/// One orchestration run for a single user request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub original_request: String,
    pub session_id: String,
    pub topic_id: Option<String>,
    pub status: TaskStatus,
    /// High-level plan text from the planning call
    pub plan: Option<String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub agents: Vec<AgentAssignment>,
    #[serde(default)]
    pub is_multi_agent: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub current_step_index: usize,
    pub final_result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(request: &CreateTaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            original_request: request.request.clone(),
            session_id: request.session_id.clone(),
            topic_id: request.topic_id.clone(),
            status: TaskStatus::Pending,
            plan: None,
            steps: Vec::new(),
            agents: Vec::new(),
            is_multi_agent: false,
            completed_steps: 0,
            total_steps: 0,
            current_step_index: 0,
            final_result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Replace the step list and reset progress counters
    pub fn set_steps(&mut self, steps: Vec<Step>) {
        self.total_steps = steps.len();
        self.steps = steps;
        self.completed_steps = 0;
        self.current_step_index = 0;
        self.touch();
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    /// Count one more executed step, never past the total
    pub fn record_step_done(&mut self) {
        self.completed_steps = (self.completed_steps + 1).min(self.total_steps);
        self.touch();
    }

    pub fn complete(&mut self, final_result: impl Into<String>) {
        self.final_result = Some(final_result.into());
        self.set_status(TaskStatus::Completed);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.set_status(TaskStatus::Failed);
    }

    /// Fail with a halting step's error, copied as is
    pub fn halt(&mut self, error: Option<String>) {
        self.error = error;
        self.set_status(TaskStatus::Failed);
    }

    /// Cancel a pending or executing task. Remaining pending steps are
    /// marked skipped. Terminal tasks are left alone.
    pub fn cancel(&mut self) -> bool {
        if !matches!(self.status, TaskStatus::Pending | TaskStatus::Executing) {
            return false;
        }
        self.set_status(TaskStatus::Cancelled);
        for step in self.steps.iter_mut() {
            step.skip();
        }
        true
    }

    /// Stamp the end of an execution run
    pub fn stamp_finished(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    pub fn progress(&self) -> TaskProgress {
        let percentage = if self.total_steps > 0 {
            ((self.completed_steps as f64 / self.total_steps as f64) * 100.0).round() as u8
        } else {
            0
        };
        let current_step = self
            .current_step()
            .map(|s| s.description.clone())
            .unwrap_or_else(|| "Unknown".into());
        let remaining = self.total_steps.saturating_sub(self.completed_steps) as u32;

        TaskProgress {
            percentage,
            current_step,
            eta: AVG_STEP_TIME * remaining,
        }
    }

    pub fn pending_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Pending)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_steps(n: usize) -> Task {
        let mut task = Task::new(&CreateTaskRequest::new("Research rust", "session-1"));
        task.set_steps((0..n).map(|i| Step::new(format!("step {i}"), None)).collect());
        task
    }

    #[test]
    fn test_task_creation() {
        let mut request = CreateTaskRequest::new("Research rust", "session-1");
        request.topic_id = Some("topic-9".into());
        let task = Task::new(&request);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.original_request, "Research rust");
        assert_eq!(task.session_id, "session-1");
        assert_eq!(task.topic_id.as_deref(), Some("topic-9"));
        assert!(task.steps.is_empty());
        assert_eq!(task.total_steps, 0);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_set_steps_updates_total() {
        let task = task_with_steps(3);
        assert_eq!(task.total_steps, 3);
        assert_eq!(task.completed_steps, 0);
        assert_eq!(task.pending_steps(), 3);
    }

    #[test]
    fn test_record_step_done_is_capped() {
        let mut task = task_with_steps(1);
        task.record_step_done();
        task.record_step_done();
        assert_eq!(task.completed_steps, 1);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Executing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_cancel_skips_pending_steps() {
        let mut task = task_with_steps(3);
        task.set_status(TaskStatus::Executing);
        task.steps[0].finish(&crate::task::StepOutcome::ok("done"));

        assert!(task.cancel());
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.steps[0].status, StepStatus::Completed);
        assert_eq!(task.steps[1].status, StepStatus::Skipped);
        assert_eq!(task.steps[2].status, StepStatus::Skipped);
    }

    #[test]
    fn test_cancel_terminal_task_is_noop() {
        let mut task = task_with_steps(1);
        task.complete("all done");
        assert!(!task.cancel());
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_progress_summary() {
        let mut task = task_with_steps(4);
        task.record_step_done();
        task.current_step_index = 1;

        let progress = task.progress();
        assert_eq!(progress.percentage, 25);
        assert_eq!(progress.current_step, "step 1");
        assert_eq!(progress.eta, Duration::from_secs(15));
    }

    #[test]
    fn test_progress_empty_task() {
        let task = Task::new(&CreateTaskRequest::new("hi", "s"));
        let progress = task.progress();
        assert_eq!(progress.percentage, 0);
        assert_eq!(progress.current_step, "Unknown");
        assert_eq!(progress.eta, Duration::ZERO);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        let status: TaskStatus = serde_json::from_str("\"executing\"").unwrap();
        assert_eq!(status, TaskStatus::Executing);
    }

    #[test]
    fn test_create_request_deserialization() {
        let request: CreateTaskRequest = serde_json::from_str(
            r#"{"request": "do it", "sessionId": "s1", "maxSteps": 4, "allowedTools": ["web_search"]}"#,
        )
        .unwrap();
        assert_eq!(request.session_id, "s1");
        assert_eq!(request.max_steps, Some(4));
        assert_eq!(request.allowed_tools, Some(vec!["web_search".to_string()]));
        assert!(request.topic_id.is_none());
    }

    #[test]
    fn test_task_serializes_camel_case() {
        let mut task = task_with_steps(1);
        let mut assignment = AgentAssignment::new("researcher");
        assignment.step_ids = vec![task.steps[0].id.clone()];
        task.agents = vec![assignment];
        task.complete("done");

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["sessionId"], "session-1");
        assert_eq!(json["finalResult"], "done");
        assert_eq!(json["totalSteps"], 1);
        assert_eq!(json["isMultiAgent"], false);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["agents"][0]["agentId"], "researcher");
        assert_eq!(json["agents"][0]["stepIds"][0], json["steps"][0]["id"]);
        assert!(json.get("session_id").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.final_result.as_deref(), Some("done"));
    }

    #[test]
    fn test_halt_copies_error_as_is() {
        let mut task = task_with_steps(1);
        task.set_status(TaskStatus::Executing);
        task.halt(None);
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.is_none());

        let mut task = task_with_steps(1);
        task.halt(Some("sandbox unavailable".into()));
        assert_eq!(task.error.as_deref(), Some("sandbox unavailable"));
    }

    #[test]
    fn test_status_display_name() {
        assert_eq!(TaskStatus::Executing.display_name(), "Executing");
        assert_eq!(TaskStatus::Cancelled.display_name(), "Cancelled");
    }
}
