use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conductor::agent::{AgentCoordinator, ExecutionHooks, StepExecutor};
use conductor::config::OrchestratorConfig;
use conductor::task::{
    estimate_task_duration, parse_plan_response, CreateTaskRequest, Step, StepOutcome,
    TaskPlan, TaskPlanner, TaskStatus,
};
use conductor::tools::{register_builtin_tools, ToolRegistry};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Plan, route and run multi-step agent tasks", long_about = None)]
struct Cli {
    /// Directory holding config.json (defaults to the user config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a request looks like it needs multi-step handling
    Check {
        request: String,
    },
    /// Show how the steps of a plan file would be routed to agents
    Route {
        #[arg(long)]
        plan: PathBuf,
    },
    /// Execute a plan file against the configured host
    Run {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        request: String,
        #[arg(long, default_value = "cli")]
        session: String,
        #[arg(long)]
        max_steps: Option<usize>,
        /// Restrict the plan to these tools (repeatable)
        #[arg(long = "allow-tool")]
        allow_tools: Vec<String>,
    },
}

/// Logs execution events and forwards Ctrl-C as cancellation
struct LogHooks {
    cancel: CancellationToken,
}

impl ExecutionHooks for LogHooks {
    fn should_cancel(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn on_agent_start(&self, agent_id: &str, step_count: usize) {
        info!(agent_id, step_count, "Agent started");
    }

    fn on_step_start(&self, step: &Step, index: usize) {
        info!(index, step = %step.description, tool = step.tool.as_deref().unwrap_or("-"), "Step started");
    }

    fn on_step_complete(&self, step: &Step, outcome: &StepOutcome) {
        let status = step.status.display_name();
        if outcome.success {
            info!(step = %step.description, status, "Step finished");
        } else {
            warn!(step = %step.description, status, error = outcome.error.as_deref().unwrap_or(""), "Step finished");
        }
    }

    fn on_agent_complete(&self, agent_id: &str, results: &[String]) {
        info!(agent_id, results = results.len(), "Agent finished");
    }

    fn on_progress(&self, completed: usize, total: usize) {
        debug!(completed, total, "Progress");
    }
}

fn init_tracing(verbose: u8) {
    let fallback_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(dir: Option<PathBuf>) -> Result<OrchestratorConfig> {
    match dir.or_else(OrchestratorConfig::default_dir) {
        Some(dir) => OrchestratorConfig::load(&dir),
        None => Ok(OrchestratorConfig::default()),
    }
}

fn read_plan(path: &Path) -> Result<TaskPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan: {}", path.display()))?;
    parse_plan_response(&content).context("Invalid plan file")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config_dir)?;
    let registry = Arc::new(config.build_registry()?);
    let planner = TaskPlanner::new();

    match cli.command {
        Commands::Check { request } => {
            let agents: Vec<&str> = registry
                .find_agents_for_query(&request)
                .into_iter()
                .map(|p| p.id.as_str())
                .collect();
            let report = json!({
                "agentic": planner.quick_agentic_check(&request),
                "agents": agents,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Route { plan } => {
            let steps = planner.plan_to_steps(&read_plan(&plan)?);
            let assignments = registry.route_steps_to_agents(&steps);
            let routed: Vec<_> = assignments
                .iter()
                .map(|a| {
                    let descriptions: Vec<&str> = steps
                        .iter()
                        .filter(|s| a.step_ids.contains(&s.id))
                        .map(|s| s.description.as_str())
                        .collect();
                    json!({ "agentId": a.agent_id, "steps": descriptions })
                })
                .collect();
            let report = json!({
                "multiAgent": registry.should_use_multi_agent(&steps),
                "estimatedMs": estimate_task_duration(&steps).as_millis() as u64,
                "assignments": routed,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Run {
            plan,
            request,
            session,
            max_steps,
            allow_tools,
        } => {
            let parsed = read_plan(&plan)?;

            let mut create = CreateTaskRequest::new(request, session);
            create.max_steps = max_steps;
            if !allow_tools.is_empty() {
                create.allowed_tools = Some(allow_tools);
            }
            let mut task = planner.build_task(&create, parsed)?;

            let mut tools = ToolRegistry::new();
            register_builtin_tools(&mut tools, config.host_client()?);
            let coordinator =
                AgentCoordinator::new(registry.clone(), StepExecutor::new(Arc::new(tools)));

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling after the current step");
                    on_signal.cancel();
                }
            });

            let status = coordinator.run(&mut task, &LogHooks { cancel }).await;
            println!("{}", serde_json::to_string_pretty(&task)?);

            info!(task_id = %task.id, status = status.display_name(), "Run finished");
            if status == TaskStatus::Failed {
                bail!(
                    "Task failed: {}",
                    task.error.as_deref().unwrap_or("halted without an error message")
                );
            }
        }
    }

    Ok(())
}
