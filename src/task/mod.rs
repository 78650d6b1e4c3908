mod planner;
mod step;
#[allow(clippy::module_inception)]
mod task;

pub use planner::{
    estimate_task_duration, parse_plan_response, planning_prompt, should_use_agentic_mode,
    PlannedStep, PlanningError, PlanningModel, TaskPlan, TaskPlanner,
};
pub use step::{Step, StepOutcome, StepStatus};
pub use task::{CreateTaskRequest, Task, TaskProgress, TaskStatus};
