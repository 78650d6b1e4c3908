use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::profile::SpecialistProfile;
use crate::task::{Step, StepOutcome};
use crate::tools::ToolRegistry;

/// What the executor knows while running one step
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub task_id: &'a str,
    /// Results produced so far across the whole task, in production order
    pub previous_results: &'a [String],
    /// Profile the step was routed to, if any
    pub agent: Option<&'a SpecialistProfile>,
}

/// Input for a step without a tool
#[derive(Debug, Clone, Copy)]
pub struct ReasoningRequest<'a> {
    pub task_id: &'a str,
    pub description: &'a str,
    pub previous_results: &'a [String],
    /// Agent system prompt, passed through untouched
    pub system_prompt: Option<&'a str>,
}

/// Produces the text for a reasoning step. A language-model backend plugs in here.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, request: ReasoningRequest<'_>) -> anyhow::Result<String>;
}

/// Completes every reasoning step with a fixed acknowledgement
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderReasoner;

#[async_trait]
impl Reasoner for PlaceholderReasoner {
    async fn reason(&self, request: ReasoningRequest<'_>) -> anyhow::Result<String> {
        Ok(format!("Reasoning completed for: {}", request.description))
    }
}

/// Runs single steps. Every failure is folded into the returned outcome.
#[derive(Clone)]
pub struct StepExecutor {
    tools: Arc<ToolRegistry>,
    reasoner: Arc<dyn Reasoner>,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl StepExecutor {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            reasoner: Arc::new(PlaceholderReasoner),
        }
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = reasoner;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute one step. The step is never left `running` on return.
    pub async fn execute_step(&self, step: &mut Step, ctx: StepContext<'_>) -> StepOutcome {
        step.start();
        info!(
            task_id = ctx.task_id,
            step_id = %step.id,
            tool = step.tool.as_deref().unwrap_or("-"),
            agent_id = ctx.agent.map(|a| a.id.as_str()).unwrap_or("-"),
            "Executing step"
        );

        let outcome = match step.tool.as_deref() {
            Some(tool) => self.run_tool(tool, step.tool_input.clone()).await,
            None => self.run_reasoning(step, ctx).await,
        };

        step.finish(&outcome);
        if outcome.success {
            debug!(step_id = %step.id, status = step.status.display_name(), "Step finished");
        } else {
            warn!(
                step_id = %step.id,
                status = step.status.display_name(),
                error = outcome.error.as_deref().unwrap_or(""),
                should_continue = outcome.should_continue,
                "Step failed"
            );
        }
        outcome
    }

    async fn run_tool(&self, tool: &str, input: Option<Value>) -> StepOutcome {
        let Some(handler) = self.tools.get(tool) else {
            return StepOutcome::fatal(format!("Unknown tool: {tool}"));
        };

        let input = input.unwrap_or_else(|| json!({}));
        match AssertUnwindSafe(handler.invoke(input)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => StepOutcome::fatal(err.to_string()),
            Err(panic) => StepOutcome::fatal(panic_message(panic)),
        }
    }

    async fn run_reasoning(&self, step: &Step, ctx: StepContext<'_>) -> StepOutcome {
        let request = ReasoningRequest {
            task_id: ctx.task_id,
            description: &step.description,
            previous_results: ctx.previous_results,
            system_prompt: ctx.agent.map(|a| a.execution.system_prompt.as_str()),
        };

        match AssertUnwindSafe(self.reasoner.reason(request)).catch_unwind().await {
            Ok(Ok(text)) => StepOutcome::ok(text),
            Ok(Err(err)) => StepOutcome::fatal(err.to_string()),
            Err(panic) => StepOutcome::fatal(panic_message(panic)),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "Tool handler panicked".to_string()
    }
}
