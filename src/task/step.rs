use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        }
    }
}

/// Outcome of running one step, either produced by a tool handler or
/// synthesized by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub should_continue: bool,
}

impl StepOutcome {
    /// Successful outcome carrying a result text
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            output: None,
            error: None,
            should_continue: true,
        }
    }

    /// Successful outcome with raw tool output attached
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Failure that halts the whole task
    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            output: None,
            error: Some(error.into()),
            should_continue: false,
        }
    }

    /// Failure that lets execution move on to the next step
    pub fn recoverable(error: impl Into<String>) -> Self {
        Self {
            should_continue: true,
            ..Self::fatal(error)
        }
    }

    /// Success that asks the executor to stop after this step
    pub fn finish(result: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            ..Self::ok(result)
        }
    }
}

/// One unit of work within a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub description: String,
    /// Tool to use (None for pure reasoning steps)
    pub tool: Option<String>,
    pub tool_input: Option<Value>,
    pub status: StepStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub tool_output: Option<Value>,
    /// Agent profile that executed this step
    pub agent_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(description: impl Into<String>, tool: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            tool,
            tool_input: None,
            status: StepStatus::Pending,
            result: None,
            error: None,
            tool_output: None,
            agent_id: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.tool_input = Some(input);
        self
    }

    /// Mark the step as running and record the start time
    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Copy an outcome onto the step and close it out.
    pub fn finish(&mut self, outcome: &StepOutcome) {
        self.status = if outcome.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.result = outcome.result.clone();
        self.error = outcome.error.clone();
        self.tool_output = outcome.output.clone();
        self.completed_at = Some(Utc::now());
    }

    pub fn skip(&mut self) {
        if self.status == StepStatus::Pending {
            self.status = StepStatus::Skipped;
        }
    }
}
