use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use phaseflow::{
    AgentRegistry, Config, Coordinator, CoordinatorEvent, DependencyGraph, ExecutionPlan,
    Result, RunContext, RunResult, Task,
};

/// Phaseflow - dependency-aware phase scheduler for agent tasks
#[derive(Parser, Debug)]
#[command(name = "phaseflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    PHASEFLOW_DEBUG=1   Enable debug logging (alternative to --debug)\n    RUST_LOG            Override the log filter"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Config file (defaults to ~/.phaseflow/phaseflow.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Check a task file for structural errors
    Validate {
        /// JSON file containing an array of tasks
        tasks: PathBuf,
    },

    /// Show the execution plan for a task file
    Plan {
        /// JSON file containing an array of tasks
        tasks: PathBuf,

        /// Print the plan as JSON
        #[arg(long, conflicts_with = "dot")]
        json: bool,

        /// Print the dependency graph in Graphviz format
        #[arg(long)]
        dot: bool,
    },

    /// Execute a task file with the configured agents
    Run {
        /// JSON file containing an array of tasks
        tasks: PathBuf,

        /// Stream events and the result as JSON lines
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // The config decides the log format, so it is read before the
    // subscriber exists and summarized once logging is up.
    let path = config_path(&cli)?;
    let config = Config::load_from(&path)?;
    phaseflow::log::init(cli.debug, config.log_json);
    debug!(
        path = %path.display(),
        found = path.exists(),
        agents = config.agents.len(),
        working_dir = %config.effective_working_dir().display(),
        log_json = config.log_json,
        "config loaded"
    );
    debug!(command = ?cli.command, "phaseflow starting");

    match cli.command {
        Command::Validate { tasks } => run_validate(&tasks),
        Command::Plan { tasks, json, dot } => run_plan(&tasks, json, dot),
        Command::Run { tasks, json } => run_tasks(&tasks, json, &config),
    }
}

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => Config::config_path(),
    }
}

fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let contents = std::fs::read_to_string(path)?;
    let tasks: Vec<Task> = serde_json::from_str(&contents)?;
    debug!(path = %path.display(), tasks = tasks.len(), "loaded task file");
    Ok(tasks)
}

fn run_validate(path: &Path) -> Result<ExitCode> {
    let graph = DependencyGraph::build(load_tasks(path)?);
    let report = graph.validate();

    if report.is_valid() {
        println!(
            "OK: {} tasks, {} dependencies",
            graph.len(),
            graph.dependency_count()
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("Invalid task graph ({} errors):", report.errors.len());
    for error in &report.errors {
        println!("  • {}", error);
    }
    Ok(ExitCode::FAILURE)
}

fn run_plan(path: &Path, json: bool, dot: bool) -> Result<ExitCode> {
    let graph = DependencyGraph::build(load_tasks(path)?);

    if dot {
        print!("{}", graph.to_dot());
        return Ok(ExitCode::SUCCESS);
    }

    let report = graph.validate();
    if !report.is_valid() {
        eprintln!("Error: {}", phaseflow::Error::InvalidGraph(report));
        return Ok(ExitCode::FAILURE);
    }

    let plan = ExecutionPlan::create(&graph)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(ExitCode::SUCCESS);
    }

    let critical = graph.critical_path()?;
    print_plan(&plan);
    if !critical.is_empty() {
        let chain: Vec<String> = critical.task_ids().iter().map(|id| id.to_string()).collect();
        println!(
            "  Critical path:       {} ({} min)",
            chain.join(" -> "),
            critical.duration
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn print_plan(plan: &ExecutionPlan) {
    for phase in &plan.phases {
        let ids: Vec<String> = phase.task_ids().iter().map(|id| id.to_string()).collect();
        println!(
            "Phase {} ({} min{}): {}",
            phase.phase_number,
            phase.estimated_duration,
            if phase.can_run_in_parallel {
                ", parallel"
            } else {
                ""
            },
            ids.join(", ")
        );
    }
    println!();
    println!("  Tasks:               {}", plan.total_tasks);
    println!("  Phases:              {}", plan.phase_count());
    println!("  Total duration:      {} min", plan.total_duration);
    println!("  Sequential duration: {} min", plan.sequential_duration);
    println!(
        "  Parallelization:     {:.1}%",
        plan.parallelization_ratio * 100.0
    );
}

fn run_tasks(path: &Path, json: bool, config: &Config) -> Result<ExitCode> {
    let tasks = load_tasks(path)?;
    let registry = AgentRegistry::from_config(config);
    if registry.is_empty() {
        warn!("no agents configured; every task will fail to bind");
    }

    let coordinator = Coordinator::new(registry);
    let ctx = RunContext::new(config.effective_working_dir());

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = rt.block_on(execute_streaming(&coordinator, tasks, &ctx, json))?;

    if json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        print_result(&result);
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run the coordinator while printing its events as they arrive.
async fn execute_streaming(
    coordinator: &Coordinator,
    tasks: Vec<Task>,
    ctx: &RunContext,
    json: bool,
) -> Result<RunResult> {
    let mut events = coordinator.subscribe();
    let run = coordinator.execute(tasks, ctx);
    tokio::pin!(run);

    let result = loop {
        tokio::select! {
            result = &mut run => break result?,
            Some(event) = events.recv() => print_event(&event, json)?,
        }
    };

    while let Ok(event) = events.try_recv() {
        print_event(&event, json)?;
    }
    Ok(result)
}

fn print_event(event: &CoordinatorEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        eprintln!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), event);
    }
    Ok(())
}

fn print_result(result: &RunResult) {
    println!();
    println!("  Run ID:          {}", result.run_id);
    println!(
        "  Status:          {}",
        if result.success { "completed" } else { "failed" }
    );
    println!("  Tasks completed: {}", result.tasks_completed);
    println!("  Duration:        {:.1}s", result.duration);
    if let Some(error) = &result.error {
        println!("  Error:           {}", error);
    }
    for task in &result.task_results {
        let mark = if task.success { "✓" } else { "✗" };
        println!("    {} {} ({:.1}s)", mark, task.task_id, task.duration_secs);
    }
}
