use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::executor::{StepContext, StepExecutor};
use super::registry::{AgentAssignment, AgentRegistry, AssignmentStatus};
use crate::task::{Step, StepOutcome, StepStatus, Task, TaskStatus};

/// Final result when no agent produced anything
pub const NO_RESULTS: &str = "No results were produced by the agents.";
/// Separator between per-agent blocks in a merged result
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const RESULT_JOINER: &str = "\n\n";

/// Host callbacks fired synchronously during execution. All optional.
pub trait ExecutionHooks: Send + Sync {
    /// Checked before every assignment and every step
    fn should_cancel(&self) -> bool {
        false
    }

    fn on_agent_start(&self, _agent_id: &str, _step_count: usize) {}

    fn on_step_start(&self, _step: &Step, _index: usize) {}

    fn on_step_complete(&self, _step: &Step, _outcome: &StepOutcome) {}

    fn on_agent_complete(&self, _agent_id: &str, _results: &[String]) {}

    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// No callbacks, never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ExecutionHooks for NoHooks {}

impl ExecutionHooks for CancellationToken {
    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

/// Runs a task's steps across its agent assignments.
///
/// The coordinator is the single writer of the task while it runs: steps and
/// assignments execute one at a time, each awaited before the next starts.
#[derive(Debug, Clone)]
pub struct AgentCoordinator {
    registry: Arc<AgentRegistry>,
    executor: StepExecutor,
}

impl AgentCoordinator {
    pub fn new(registry: Arc<AgentRegistry>, executor: StepExecutor) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Pick multi-agent coordination when the steps span several agents,
    /// plain sequential execution otherwise.
    pub async fn run(&self, task: &mut Task, hooks: &dyn ExecutionHooks) -> TaskStatus {
        task.is_multi_agent =
            !task.agents.is_empty() || self.registry.should_use_multi_agent(&task.steps);
        if task.is_multi_agent {
            self.coordinate(task, hooks).await
        } else {
            self.execute_task(task, hooks).await
        }
    }

    /// Execute every assignment in routing order.
    pub async fn coordinate(&self, task: &mut Task, hooks: &dyn ExecutionHooks) -> TaskStatus {
        if task.status.is_terminal() {
            warn!(task_id = %task.id, status = task.status.display_name(), "Task already finished");
            return task.status;
        }

        task.set_status(TaskStatus::Executing);
        task.total_steps = task.steps.len();
        if task.agents.is_empty() {
            task.agents = self.registry.route_steps_to_agents(&task.steps);
        }
        info!(task_id = %task.id, agents = task.agents.len(), steps = task.total_steps, "Coordinating task");

        let mut previous_results: Vec<String> = Vec::new();

        'assignments: for a in 0..task.agents.len() {
            if hooks.should_cancel() {
                info!(task_id = %task.id, "Task cancelled before next agent");
                task.cancel();
                break;
            }

            let agent_id = task.agents[a].agent_id.clone();
            let profile = self.registry.get(&agent_id);
            // the task's step order wins over the assignment's declared order;
            // a step listed under several agents runs once
            let indices: Vec<usize> = task
                .steps
                .iter()
                .enumerate()
                .filter(|(_, s)| s.status == StepStatus::Pending)
                .filter(|(_, s)| task.agents[a].step_ids.contains(&s.id))
                .map(|(i, _)| i)
                .collect();

            task.agents[a].status = AssignmentStatus::Working;
            task.touch();
            info!(task_id = %task.id, agent_id = %agent_id, steps = indices.len(), "Agent starting");
            hooks.on_agent_start(&agent_id, task.agents[a].step_ids.len());

            let mut agent_results: Vec<String> = Vec::new();

            for idx in indices {
                if hooks.should_cancel() {
                    info!(task_id = %task.id, agent_id = %agent_id, "Task cancelled mid-agent");
                    let assignment = &mut task.agents[a];
                    assignment.status = AssignmentStatus::Cancelled;
                    assignment.result = join_results(&agent_results);
                    task.cancel();
                    break 'assignments;
                }

                task.current_step_index = idx;
                task.steps[idx].agent_id = Some(agent_id.clone());
                hooks.on_step_start(&task.steps[idx], idx);

                let ctx = StepContext {
                    task_id: &task.id,
                    previous_results: &previous_results,
                    agent: profile,
                };
                let outcome = self.executor.execute_step(&mut task.steps[idx], ctx).await;
                hooks.on_step_complete(&task.steps[idx], &outcome);

                if outcome.success {
                    if let Some(result) = &outcome.result {
                        previous_results.push(result.clone());
                        agent_results.push(result.clone());
                    }
                }

                task.record_step_done();
                hooks.on_progress(task.completed_steps, task.total_steps);

                if !outcome.should_continue {
                    warn!(
                        task_id = %task.id,
                        agent_id = %agent_id,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "Step halted the task"
                    );
                    let assignment = &mut task.agents[a];
                    assignment.status = AssignmentStatus::Failed;
                    assignment.error = outcome.error.clone();
                    assignment.result = join_results(&agent_results);
                    task.halt(outcome.error.clone());
                    task.final_result = merge_partial_results(&task.agents, &self.registry);
                    break 'assignments;
                }
            }

            let assignment = &mut task.agents[a];
            assignment.status = AssignmentStatus::Done;
            assignment.result = Some(agent_results.join(RESULT_JOINER));
            info!(task_id = %task.id, agent_id = %agent_id, "Agent done");
            hooks.on_agent_complete(&agent_id, &agent_results);
        }

        if task.status == TaskStatus::Executing {
            let merged = merge_agent_results(&task.agents, &self.registry);
            task.complete(merged);
        }

        task.stamp_finished();
        info!(task_id = %task.id, status = task.status.display_name(), "Task finished");
        task.status
    }

    /// Cancel a task that is not running right now. Working assignments are
    /// marked cancelled as well. Returns false for finished tasks.
    pub fn cancel_task(&self, task: &mut Task) -> bool {
        if !task.cancel() {
            return false;
        }
        for assignment in task.agents.iter_mut() {
            if assignment.status == AssignmentStatus::Working {
                assignment.status = AssignmentStatus::Cancelled;
            }
        }
        task.stamp_finished();
        info!(task_id = %task.id, "Task cancelled");
        true
    }

    /// Execute steps one after another from `current_step_index`, without
    /// agent assignments.
    pub async fn execute_task(&self, task: &mut Task, hooks: &dyn ExecutionHooks) -> TaskStatus {
        if task.status.is_terminal() {
            warn!(task_id = %task.id, status = task.status.display_name(), "Task already finished");
            return task.status;
        }

        task.set_status(TaskStatus::Executing);
        task.total_steps = task.steps.len();
        info!(task_id = %task.id, steps = task.total_steps, "Executing task");

        // results of steps finished in an earlier run stay visible
        let mut previous_results: Vec<String> = task
            .steps
            .iter()
            .take(task.current_step_index)
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| s.result.clone())
            .collect();

        for idx in task.current_step_index..task.steps.len() {
            if hooks.should_cancel() {
                info!(task_id = %task.id, "Task cancelled");
                task.cancel();
                break;
            }

            task.current_step_index = idx;
            hooks.on_step_start(&task.steps[idx], idx);

            let ctx = StepContext {
                task_id: &task.id,
                previous_results: &previous_results,
                agent: None,
            };
            let outcome = self.executor.execute_step(&mut task.steps[idx], ctx).await;
            hooks.on_step_complete(&task.steps[idx], &outcome);

            if outcome.success {
                if let Some(result) = &outcome.result {
                    previous_results.push(result.clone());
                }
            }

            task.completed_steps = task.completed_steps.max(idx + 1).min(task.total_steps);
            task.touch();
            hooks.on_progress(task.completed_steps, task.total_steps);

            if !outcome.should_continue {
                if outcome.success {
                    info!(task_id = %task.id, "Step finished the task early");
                    task.complete(previous_results.join(RESULT_JOINER));
                } else {
                    warn!(
                        task_id = %task.id,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "Step halted the task"
                    );
                    task.halt(outcome.error.clone());
                    task.final_result = join_results(&previous_results);
                }
                break;
            }
        }

        if task.status == TaskStatus::Executing {
            task.complete(previous_results.join(RESULT_JOINER));
        }

        task.stamp_finished();
        info!(task_id = %task.id, status = task.status.display_name(), "Task finished");
        task.status
    }
}

fn join_results(results: &[String]) -> Option<String> {
    if results.is_empty() {
        None
    } else {
        Some(results.join(RESULT_JOINER))
    }
}

fn merge_blocks(contributors: &[&AgentAssignment], registry: &AgentRegistry) -> Option<String> {
    match contributors {
        [] => None,
        [only] => only.result.clone(),
        many => {
            let sections: Vec<String> = many
                .iter()
                .map(|a| {
                    let header = match registry.get(&a.agent_id) {
                        Some(profile) => format!("## {} Results", profile.name),
                        None => format!("## Agent {}", a.agent_id),
                    };
                    format!("{header}\n\n{}", a.result.as_deref().unwrap_or_default())
                })
                .collect();
            Some(sections.join(SECTION_SEPARATOR))
        }
    }
}

fn has_result(assignment: &AgentAssignment) -> bool {
    assignment.result.as_deref().is_some_and(|r| !r.is_empty())
}

/// Merge the results of finished assignments into one text.
///
/// Only `done` assignments with a non-empty result count. A single contributor
/// is returned as is; several get an agent header each and are separated by a
/// horizontal rule, in assignment order.
pub fn merge_agent_results(assignments: &[AgentAssignment], registry: &AgentRegistry) -> String {
    let contributors: Vec<&AgentAssignment> = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Done && has_result(a))
        .collect();
    merge_blocks(&contributors, registry).unwrap_or_else(|| NO_RESULTS.to_string())
}

/// Like [`merge_agent_results`] but also keeps the partial output of the
/// assignment that failed. `None` when nothing was produced.
pub fn merge_partial_results(
    assignments: &[AgentAssignment],
    registry: &AgentRegistry,
) -> Option<String> {
    let contributors: Vec<&AgentAssignment> = assignments
        .iter()
        .filter(|a| {
            matches!(a.status, AssignmentStatus::Done | AssignmentStatus::Failed) && has_result(a)
        })
        .collect();
    merge_blocks(&contributors, registry)
}
