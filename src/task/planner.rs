//! Turning requests and planning-model output into executable tasks

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{CreateTaskRequest, Step, Task};
use crate::tools::ToolRegistry;

/// Phrases that hint a request needs more than one action
const AGENTIC_PATTERNS: &[&str] = &[
    r"research\s+(about|on|into)",
    r"find\s+out\s+about",
    r"investigate",
    r"analyze\s+and\s+summarize",
    r"then\s+(do|create|make|generate)",
    r"after\s+that",
    r"step\s+by\s+step",
    r"first.*then.*finally",
    r"automate",
    r"automatically",
    r"do\s+this\s+for\s+me",
    r"create\s+.*\s+based\s+on",
    r"generate\s+.*\s+from",
    r"compare\s+.*\s+and\s+.*\s+then",
];

const BASE_STEP_DURATION: Duration = Duration::from_millis(3000);

static AGENTIC_RULES: OnceLock<Vec<Regex>> = OnceLock::new();

fn agentic_rules() -> &'static [Regex] {
    AGENTIC_RULES.get_or_init(|| {
        AGENTIC_PATTERNS
            .iter()
            .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
            .collect()
    })
}

/// True when the request matches one of the multi-step phrases
pub fn should_use_agentic_mode(request: &str) -> bool {
    agentic_rules().iter().any(|r| r.is_match(request))
}

/// Planning failures. Every variant means no task was created and the host
/// should answer the request in a single shot.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Plan could not be parsed: {0}")]
    Unparseable(String),

    #[error("Request does not need agentic execution: {0}")]
    NotAgentic(String),

    #[error("Plan contains no steps")]
    EmptyPlan,

    #[error("Tool '{0}' is not allowed for this task")]
    ToolNotAllowed(String),

    #[error("Planning model failed: {0}")]
    Model(#[source] anyhow::Error),
}

/// One step as described by the planning model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub description: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    /// Milliseconds
    #[serde(default)]
    pub estimated_duration: Option<u64>,
    /// Parsed and kept, routing does not consult it
    #[serde(default)]
    pub agent_hint: Option<String>,
}

/// Plan description produced by the planning call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPlan {
    #[serde(default)]
    pub is_agentic: bool,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub steps: Vec<PlannedStep>,
}

/// Produces raw planning text for a prompt. A language-model backend plugs in here.
#[async_trait]
pub trait PlanningModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, request: &str) -> anyhow::Result<String>;
}

/// Parse planning-model output.
///
/// Looks inside a fenced ```json block first, then in the whole text. The
/// first JSON object carrying `isAgentic` or `steps` is taken as the plan;
/// braces in the surrounding prose and trailing text are ignored. Anything
/// that does not yield a plan object is an error.
pub fn parse_plan_response(response: &str) -> Result<TaskPlan, PlanningError> {
    let object = fenced_json(response)
        .and_then(find_plan_object)
        .or_else(|| find_plan_object(response))
        .ok_or_else(|| PlanningError::Unparseable("no plan object found".into()))?;

    serde_json::from_value::<TaskPlan>(object).map_err(|e| PlanningError::Unparseable(e.to_string()))
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

fn find_plan_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) if looks_like_plan(&value) => Some(value),
            _ => None,
        }
    })
}

fn looks_like_plan(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.contains_key("isAgentic") || o.contains_key("steps"))
}

/// System prompt for the planning call, listing the registered tools
pub fn planning_prompt(tools: &ToolRegistry) -> String {
    let tool_lines: Vec<String> = tools
        .descriptions()
        .into_iter()
        .map(|(name, description)| {
            if description.is_empty() {
                format!("- {name}")
            } else {
                format!("- {name}: {description}")
            }
        })
        .collect();

    format!(
        r#"You are an autonomous task planner. Your job is to analyze user requests and determine if they require multi-step execution.

## When to use Agentic Mode:
- Research tasks requiring multiple sources
- Tasks with explicit steps ("first... then... finally...")
- Complex analysis requiring multiple tool calls
- Automation workflows
- Content creation from multiple inputs

## When NOT to use Agentic Mode:
- Simple questions
- Single-action requests
- Creative writing without research
- Direct conversations

## Output Format (JSON):
```json
{{
  "isAgentic": true/false,
  "reasoning": "Brief explanation of decision",
  "plan": "High-level description of the plan (if agentic)",
  "steps": [
    {{
      "description": "What this step does",
      "tool": "tool_name (optional)",
      "toolInput": {{}},
      "estimatedDuration": 5000
    }}
  ]
}}
```

## Available Tools:
{tools}

Remember: Only return steps if isAgentic is true.
"#,
        tools = tool_lines.join("\n")
    )
}

/// Rough wall time for a list of steps: a fixed base per step plus a
/// per-tool overhead.
pub fn estimate_task_duration(steps: &[Step]) -> Duration {
    steps
        .iter()
        .map(|step| BASE_STEP_DURATION + tool_overhead(step.tool.as_deref()))
        .sum()
}

fn tool_overhead(tool: Option<&str>) -> Duration {
    let ms = match tool {
        Some("call_api") => 5_000,
        Some("generate_image") => 30_000,
        Some("query_database") => 2_000,
        Some("read_file") => 1_000,
        Some("run_code") => 10_000,
        Some("send_message") => 2_000,
        Some("web_search") => 5_000,
        Some("write_file") => 1_000,
        _ => 0,
    };
    Duration::from_millis(ms)
}

/// Creates tasks and decides whether a request deserves a planning call
#[derive(Debug, Clone)]
pub struct TaskPlanner {
    word_threshold: usize,
    question_threshold: usize,
}

impl Default for TaskPlanner {
    fn default() -> Self {
        Self {
            word_threshold: 30,
            question_threshold: 1,
        }
    }
}

impl TaskPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh pending task with no steps
    pub fn create_task(&self, request: &CreateTaskRequest) -> Task {
        Task::new(request)
    }

    /// Pending steps for every planned step, in plan order
    pub fn plan_to_steps(&self, plan: &TaskPlan) -> Vec<Step> {
        plan.steps
            .iter()
            .map(|planned| {
                let step = Step::new(planned.description.clone(), planned.tool.clone());
                match &planned.tool_input {
                    Some(input) => step.with_input(input.clone()),
                    None => step,
                }
            })
            .collect()
    }

    /// Local heuristic run before any planning call. A `false` here is
    /// advisory: hosts may still plan the request.
    pub fn quick_agentic_check(&self, request: &str) -> bool {
        if should_use_agentic_mode(request) {
            return true;
        }

        let words = request.split_whitespace().count();
        if words > self.word_threshold {
            return true;
        }

        request.matches('?').count() > self.question_threshold
    }

    /// Build a pending task from a parsed plan, applying the request's
    /// constraints. `max_steps` truncates; a disallowed tool rejects the plan.
    pub fn build_task(
        &self,
        request: &CreateTaskRequest,
        mut plan: TaskPlan,
    ) -> Result<Task, PlanningError> {
        if !plan.is_agentic {
            return Err(PlanningError::NotAgentic(plan.reasoning));
        }
        if plan.steps.is_empty() {
            return Err(PlanningError::EmptyPlan);
        }

        if let Some(max) = request.max_steps {
            if plan.steps.len() > max {
                debug!(planned = plan.steps.len(), max, "Truncating plan");
                plan.steps.truncate(max);
            }
            if plan.steps.is_empty() {
                return Err(PlanningError::EmptyPlan);
            }
        }

        if let Some(allowed) = &request.allowed_tools {
            if let Some(tool) = plan
                .steps
                .iter()
                .filter_map(|s| s.tool.as_deref())
                .find(|tool| !allowed.iter().any(|a| a.as_str() == *tool))
            {
                return Err(PlanningError::ToolNotAllowed(tool.to_string()));
            }
        }

        let mut task = self.create_task(request);
        task.plan = plan.plan.clone();
        task.set_steps(self.plan_to_steps(&plan));
        info!(
            task_id = %task.id,
            steps = task.total_steps,
            estimate_ms = estimate_task_duration(&task.steps).as_millis() as u64,
            "Task planned"
        );
        Ok(task)
    }

    /// Ask the planning model for a plan and build the task from it
    pub async fn plan_request(
        &self,
        request: &CreateTaskRequest,
        model: &dyn PlanningModel,
        tools: &ToolRegistry,
    ) -> Result<Task, PlanningError> {
        let prompt = planning_prompt(tools);
        let response = model
            .complete(&prompt, &request.request)
            .await
            .map_err(PlanningError::Model)?;

        let plan = parse_plan_response(&response).inspect_err(|e| {
            warn!(error = %e, "Discarding planning response");
        })?;
        self.build_task(request, plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{StepOutcome, StepStatus, TaskStatus};
    use crate::tools::{FnTool, ToolError};
    use std::sync::Arc;

    const PLAN_JSON: &str = r#"{
        "isAgentic": true,
        "reasoning": "needs research",
        "plan": "Search then summarize",
        "steps": [
            {"description": "Search the web", "tool": "web_search", "toolInput": {"query": "rust"}, "estimatedDuration": 5000},
            {"description": "Write a summary", "agentHint": "coordinator"}
        ]
    }"#;

    fn request() -> CreateTaskRequest {
        CreateTaskRequest::new("Research about rust", "session-1")
    }

    // ========================================
    // Parsing
    // ========================================

    #[test]
    fn test_parse_fenced_block() {
        let response = format!("Here is the plan:\n```json\n{PLAN_JSON}\n```\nGood luck!");
        let plan = parse_plan_response(&response).unwrap();

        assert!(plan.is_agentic);
        assert_eq!(plan.plan.as_deref(), Some("Search then summarize"));
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tool.as_deref(), Some("web_search"));
        assert_eq!(plan.steps[0].estimated_duration, Some(5000));
        assert_eq!(plan.steps[1].agent_hint.as_deref(), Some("coordinator"));
    }

    #[test]
    fn test_parse_object_inside_noise() {
        let response = format!("Sure! {PLAN_JSON} Let me know.");
        let plan = parse_plan_response(&response).unwrap();
        assert_eq!(plan.steps.len(), 2);
    }

    #[test]
    fn test_parse_ignores_braces_in_prose() {
        let before = format!("Use {{query}} placeholders. Plan: {PLAN_JSON}");
        assert_eq!(parse_plan_response(&before).unwrap().steps.len(), 2);

        let after = format!("Plan: {PLAN_JSON}\nNote: fill in {{url}} later.");
        assert_eq!(parse_plan_response(&after).unwrap().steps.len(), 2);

        let stray_object = format!("Config was {{\"retries\": 3}}. Plan: {PLAN_JSON}");
        assert!(parse_plan_response(&stray_object).unwrap().is_agentic);
    }

    #[test]
    fn test_parse_defaults_missing_fields() {
        let plan = parse_plan_response(r#"{"isAgentic": false}"#).unwrap();
        assert!(!plan.is_agentic);
        assert!(plan.reasoning.is_empty());
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn test_parse_fails_closed() {
        assert!(matches!(
            parse_plan_response("no plan today"),
            Err(PlanningError::Unparseable(_))
        ));
        assert!(matches!(
            parse_plan_response("```json\n{\"isAgentic\": tru\n```"),
            Err(PlanningError::Unparseable(_))
        ));
        assert!(matches!(
            parse_plan_response(r#"{"steps": [{"tool": "web_search"}]}"#),
            Err(PlanningError::Unparseable(_))
        ));
    }

    // ========================================
    // Heuristics
    // ========================================

    #[test]
    fn test_agentic_patterns_compile() {
        assert_eq!(agentic_rules().len(), AGENTIC_PATTERNS.len());
    }

    #[test]
    fn test_quick_agentic_check() {
        let planner = TaskPlanner::new();

        assert!(planner.quick_agentic_check("Please research about async runtimes"));
        assert!(planner.quick_agentic_check("First fetch it, then clean it, finally chart it"));
        assert!(planner.quick_agentic_check("What is Rust? Who made it?"));
        assert!(planner.quick_agentic_check(&"word ".repeat(31)));

        assert!(!planner.quick_agentic_check("What is Rust?"));
        assert!(!planner.quick_agentic_check("hello there"));
        assert!(!planner.quick_agentic_check(&"word ".repeat(30)));
    }

    #[test]
    fn test_estimate_task_duration() {
        let steps = vec![
            Step::new("search", Some("web_search".into())),
            Step::new("image", Some("generate_image".into())),
            Step::new("think", None),
            Step::new("mystery", Some("foo_bar".into())),
        ];
        assert_eq!(
            estimate_task_duration(&steps),
            Duration::from_millis(3000 * 4 + 5000 + 30_000)
        );
        assert_eq!(estimate_task_duration(&[]), Duration::ZERO);
    }

    // ========================================
    // Task building
    // ========================================

    #[test]
    fn test_create_task_is_pending_and_empty() {
        let task = TaskPlanner::new().create_task(&request());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.steps.is_empty());
        assert_eq!(task.total_steps, 0);
    }

    #[test]
    fn test_plan_to_steps() {
        let plan = parse_plan_response(PLAN_JSON).unwrap();
        let steps = TaskPlanner::new().plan_to_steps(&plan);

        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_ne!(steps[0].id, steps[1].id);
        assert_eq!(steps[0].tool_input, Some(serde_json::json!({"query": "rust"})));
        assert!(steps[1].tool.is_none());
    }

    #[test]
    fn test_build_task() {
        let plan = parse_plan_response(PLAN_JSON).unwrap();
        let task = TaskPlanner::new().build_task(&request(), plan).unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.total_steps, 2);
        assert_eq!(task.plan.as_deref(), Some("Search then summarize"));
        assert_eq!(task.original_request, "Research about rust");
    }

    #[test]
    fn test_build_task_truncates_to_max_steps() {
        let plan = parse_plan_response(PLAN_JSON).unwrap();
        let mut req = request();
        req.max_steps = Some(1);

        let task = TaskPlanner::new().build_task(&req, plan).unwrap();
        assert_eq!(task.total_steps, 1);
        assert_eq!(task.steps[0].description, "Search the web");
    }

    #[test]
    fn test_build_task_rejects() {
        let planner = TaskPlanner::new();
        let plan = parse_plan_response(PLAN_JSON).unwrap();

        let mut req = request();
        req.allowed_tools = Some(vec!["crawl_page".into()]);
        assert!(matches!(
            planner.build_task(&req, plan.clone()),
            Err(PlanningError::ToolNotAllowed(t)) if t == "web_search"
        ));

        let mut req = request();
        req.max_steps = Some(0);
        assert!(matches!(
            planner.build_task(&req, plan.clone()),
            Err(PlanningError::EmptyPlan)
        ));

        let not_agentic = TaskPlan {
            is_agentic: false,
            reasoning: "simple question".into(),
            ..plan
        };
        assert!(matches!(
            planner.build_task(&request(), not_agentic),
            Err(PlanningError::NotAgentic(r)) if r == "simple question"
        ));

        let empty = TaskPlan {
            is_agentic: true,
            ..Default::default()
        };
        assert!(matches!(
            planner.build_task(&request(), empty),
            Err(PlanningError::EmptyPlan)
        ));
    }

    #[test]
    fn test_planning_prompt_lists_tools() {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(FnTool::new(
            "web_search",
            "Search the internet for information",
            |_input: Value| async move { Ok::<_, ToolError>(StepOutcome::ok("")) },
        )));
        tools.register(Arc::new(FnTool::new("read_file", "", |_input: Value| async move {
            Ok::<_, ToolError>(StepOutcome::ok(""))
        })));

        let prompt = planning_prompt(&tools);
        assert!(prompt.contains("- read_file\n- web_search: Search the internet for information"));
        assert!(prompt.contains(r#""isAgentic": true/false"#));
    }

    // ========================================
    // Planning model
    // ========================================

    struct CannedModel(anyhow::Result<String>);

    #[async_trait]
    impl PlanningModel for CannedModel {
        async fn complete(&self, system_prompt: &str, request: &str) -> anyhow::Result<String> {
            assert!(system_prompt.contains("autonomous task planner"));
            assert_eq!(request, "Research about rust");
            match &self.0 {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    #[tokio::test]
    async fn test_plan_request() {
        let planner = TaskPlanner::new();
        let tools = ToolRegistry::new();

        let model = CannedModel(Ok(format!("```json\n{PLAN_JSON}\n```")));
        let task = planner.plan_request(&request(), &model, &tools).await.unwrap();
        assert_eq!(task.total_steps, 2);

        let model = CannedModel(Ok("I cannot help with that".into()));
        assert!(matches!(
            planner.plan_request(&request(), &model, &tools).await,
            Err(PlanningError::Unparseable(_))
        ));

        let model = CannedModel(Err(anyhow::anyhow!("rate limited")));
        let err = planner.plan_request(&request(), &model, &tools).await.unwrap_err();
        assert_eq!(err.to_string(), "Planning model failed: rate limited");
    }
}
