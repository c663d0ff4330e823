//! Coordinator: drives one scheduling run end to end.
//!
//! A run moves through `Building -> Validating -> Scheduling ->
//! Executing(phase 1..N)` and ends in `Completed` or `Failed`. Phases are
//! executed strictly one after another; the tasks of a parallel phase are
//! all in flight at once and the coordinator waits for every one of them
//! before looking at failures or moving on.
//!
//! Only one run may be active per coordinator. A second `execute` call made
//! while a run is in progress is rejected with [`Error::AlreadyRunning`].
//! A run whose future is dropped mid-flight releases the coordinator and
//! leaves the state at `Failed`.
//!
//! Every subscriber gets its own unbounded queue, so a listener that reads
//! slowly never loses events.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentOutcome, AgentRegistry, RunContext};
use crate::core::dag::DependencyGraph;
use crate::core::phases::ExecutionPhase;
use crate::core::plan::ExecutionPlan;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::orchestration::events::CoordinatorEvent;
use crate::orchestration::sink::{percent, ProgressSink};
use crate::{Error, Result};

/// Where the coordinator is in its current (or last) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    Building,
    Validating,
    Scheduling,
    Executing { phase: usize },
    Completed,
    Failed,
}

impl RunState {
    /// True between `Building` and the terminal state of a run.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RunState::Building
                | RunState::Validating
                | RunState::Scheduling
                | RunState::Executing { .. }
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Building => write!(f, "building"),
            RunState::Validating => write!(f, "validating"),
            RunState::Scheduling => write!(f, "scheduling"),
            RunState::Executing { phase } => write!(f, "executing phase {}", phase),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one dispatched task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub output: String,
    pub files_changed: Vec<String>,
    pub error: Option<String>,
    pub duration_secs: f64,
}

/// What a run reports back to its caller.
///
/// Partial progress is kept on failure: `tasks_completed`, the plan (when
/// scheduling got that far) and the results of every task that ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub success: bool,
    pub tasks_completed: usize,
    /// Wall time of the run in seconds.
    pub duration: f64,
    pub plan: Option<ExecutionPlan>,
    pub error: Option<String>,
    #[serde(default)]
    pub task_results: Vec<TaskResult>,
}

/// Holds the single-run flag for the lifetime of one `execute` call.
///
/// Dropping the guard while the state is still in flight means the run was
/// cancelled; the state is then forced to `Failed`.
struct RunGuard<'a> {
    running: &'a AtomicBool,
    state: &'a watch::Sender<RunState>,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool, state: &'a watch::Sender<RunState>) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running, state })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if state.is_in_flight() {
                warn!(state = %state, "run abandoned before finishing");
                *state = RunState::Failed;
                true
            } else {
                false
            }
        });
        self.running.store(false, Ordering::Release);
    }
}

/// Bookkeeping accumulated while phases execute.
#[derive(Default)]
struct Progress {
    total: usize,
    completed: usize,
    results: Vec<TaskResult>,
}

/// How a phase settled.
struct PhaseReport {
    results: Vec<TaskResult>,
    failure: Option<Error>,
}

pub struct Coordinator {
    registry: AgentRegistry,
    sink: Option<Arc<dyn ProgressSink>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<CoordinatorEvent>>>,
    state: watch::Sender<RunState>,
    running: AtomicBool,
}

impl Coordinator {
    pub fn new(registry: AgentRegistry) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            registry,
            sink: None,
            subscribers: Mutex::new(Vec::new()),
            state,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Register a listener for lifecycle events.
    ///
    /// The listener sees every event emitted after this call. Dropping the
    /// receiver unsubscribes it.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<CoordinatorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Watch run state changes.
    pub fn watch_state(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute one run over `tasks`.
    ///
    /// Returns `Err` only for [`Error::AlreadyRunning`]. Structural,
    /// configuration and task failures come back as a [`RunResult`] with
    /// `success: false`.
    pub async fn execute(&self, tasks: Vec<Task>, ctx: &RunContext) -> Result<RunResult> {
        let _guard = RunGuard::acquire(&self.running, &self.state).ok_or(Error::AlreadyRunning)?;
        let started = Instant::now();
        let mut progress = Progress {
            total: tasks.len(),
            ..Default::default()
        };

        info!(run_id = %ctx.run_id, tasks = tasks.len(), "run started");
        self.emit(CoordinatorEvent::ExecutionStarted {
            run_id: ctx.run_id,
            total_tasks: tasks.len(),
        });

        self.set_state(RunState::Building);
        let graph = DependencyGraph::build(tasks);

        self.set_state(RunState::Validating);
        let report = graph.validate();
        if !report.is_valid() {
            return Ok(self.fail(ctx, started, progress, None, Error::InvalidGraph(report)));
        }

        self.set_state(RunState::Scheduling);
        let plan = match ExecutionPlan::create(&graph) {
            Ok(plan) => plan,
            Err(e) => return Ok(self.fail(ctx, started, progress, None, e)),
        };
        info!(
            phases = plan.phase_count(),
            total_duration = plan.total_duration,
            sequential_duration = plan.sequential_duration,
            "plan ready"
        );

        let mut failure = None;
        for phase in &plan.phases {
            self.set_state(RunState::Executing {
                phase: phase.phase_number,
            });
            let report = self.run_phase(phase, ctx).await;

            progress.completed += report.results.iter().filter(|r| r.success).count();
            progress.results.extend(report.results);
            self.report_progress(&progress).await;

            if report.failure.is_some() {
                failure = report.failure;
                break;
            }
        }
        if let Some(failure) = failure {
            return Ok(self.fail(ctx, started, progress, Some(plan), failure));
        }

        let duration = started.elapsed().as_secs_f64();
        info!(
            run_id = %ctx.run_id,
            tasks_completed = progress.completed,
            duration_secs = duration,
            "run completed"
        );
        self.emit(CoordinatorEvent::ExecutionCompleted {
            run_id: ctx.run_id,
            tasks_completed: progress.completed,
            duration_secs: duration,
        });
        self.set_state(RunState::Completed);

        Ok(RunResult {
            run_id: ctx.run_id,
            success: true,
            tasks_completed: progress.completed,
            duration,
            plan: Some(plan),
            error: None,
            task_results: progress.results,
        })
    }

    fn fail(
        &self,
        ctx: &RunContext,
        started: Instant,
        progress: Progress,
        plan: Option<ExecutionPlan>,
        err: Error,
    ) -> RunResult {
        let message = err.to_string();
        error!(run_id = %ctx.run_id, error = %message, "run failed");
        self.emit(CoordinatorEvent::ExecutionFailed {
            run_id: ctx.run_id,
            tasks_completed: progress.completed,
            error: message.clone(),
        });
        self.set_state(RunState::Failed);

        RunResult {
            run_id: ctx.run_id,
            success: false,
            tasks_completed: progress.completed,
            duration: started.elapsed().as_secs_f64(),
            plan,
            error: Some(message),
            task_results: progress.results,
        }
    }

    async fn run_phase(&self, phase: &ExecutionPhase, ctx: &RunContext) -> PhaseReport {
        let phase_number = phase.phase_number;
        let started = Instant::now();
        info!(
            phase = phase_number,
            tasks = phase.len(),
            parallel = phase.can_run_in_parallel,
            "phase started"
        );
        self.emit(CoordinatorEvent::PhaseStarted {
            phase_number,
            task_ids: phase.task_ids(),
            parallel: phase.can_run_in_parallel,
        });

        let bound = match self.bind_agents(phase).await {
            Ok(bound) => bound,
            Err((unbound, failure)) => {
                self.emit(CoordinatorEvent::PhaseCompleted {
                    phase_number,
                    succeeded: 0,
                    failed: unbound,
                    duration_secs: started.elapsed().as_secs_f64(),
                });
                return PhaseReport {
                    results: Vec::new(),
                    failure: Some(failure),
                };
            }
        };

        let results = if phase.can_run_in_parallel {
            join_all(
                bound
                    .iter()
                    .map(|(task, agent)| self.run_task(task, agent.as_ref(), ctx, phase_number)),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(bound.len());
            for (task, agent) in &bound {
                let result = self.run_task(task, agent.as_ref(), ctx, phase_number).await;
                let failed = !result.success;
                results.push(result);
                if failed {
                    break;
                }
            }
            results
        };

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let duration = started.elapsed().as_secs_f64();
        info!(
            phase = phase_number,
            succeeded,
            failed,
            duration_secs = duration,
            "phase settled"
        );
        self.emit(CoordinatorEvent::PhaseCompleted {
            phase_number,
            succeeded,
            failed,
            duration_secs: duration,
        });

        let failure = results.iter().find(|r| !r.success).map(|r| Error::TaskFailed {
            task_id: r.task_id.clone(),
            error: r.error.clone().unwrap_or_default(),
        });
        PhaseReport { results, failure }
    }

    /// Resolve an agent for every task of the phase.
    ///
    /// Nothing is dispatched unless every task has an agent. On failure
    /// returns the number of unbound tasks and the first binding error.
    async fn bind_agents<'p>(
        &self,
        phase: &'p ExecutionPhase,
    ) -> std::result::Result<Vec<(&'p Task, Arc<dyn Agent>)>, (usize, Error)> {
        let mut bound = Vec::with_capacity(phase.len());
        let mut unbound = Vec::new();
        for task in &phase.tasks {
            match self.registry.get(&task.agent_type) {
                Some(agent) => bound.push((task, agent)),
                None => unbound.push((
                    &task.id,
                    Error::AgentNotRegistered {
                        agent_type: task.agent_type.clone(),
                        task_id: task.id.clone(),
                    },
                )),
            }
        }

        if !unbound.is_empty() {
            for (task_id, err) in &unbound {
                let message = err.to_string();
                warn!(task = %task_id, error = %message, "cannot bind task");
                self.emit(CoordinatorEvent::TaskFailed {
                    task_id: (*task_id).clone(),
                    error: message.clone(),
                });
                self.notify_status(task_id, &TaskStatus::Failed { error: message })
                    .await;
            }
            let count = unbound.len();
            let (_, first) = unbound.swap_remove(0);
            return Err((count, first));
        }

        for (task, _) in &bound {
            debug!(task = %task.id, agent_type = %task.agent_type, "task assigned");
            self.emit(CoordinatorEvent::TaskAssigned {
                task_id: task.id.clone(),
                agent_type: task.agent_type.clone(),
            });
            self.notify_status(&task.id, &TaskStatus::Assigned).await;
        }
        Ok(bound)
    }

    async fn run_task(
        &self,
        task: &Task,
        agent: &dyn Agent,
        ctx: &RunContext,
        phase_number: usize,
    ) -> TaskResult {
        self.emit(CoordinatorEvent::TaskStarted {
            task_id: task.id.clone(),
            phase_number,
        });
        self.notify_status(&task.id, &TaskStatus::Active).await;

        let started = Instant::now();
        let outcome = agent
            .handle(task, ctx)
            .await
            .unwrap_or_else(|e| AgentOutcome::failure(e.to_string()));
        let duration_secs = started.elapsed().as_secs_f64();

        if outcome.success {
            info!(task = %task.id, duration_secs, "task completed");
            self.emit(CoordinatorEvent::TaskCompleted {
                task_id: task.id.clone(),
                duration_secs,
                files_changed: outcome.files_changed.clone(),
            });
            self.notify_status(&task.id, &TaskStatus::Completed).await;
            return TaskResult {
                task_id: task.id.clone(),
                success: true,
                output: outcome.output,
                files_changed: outcome.files_changed,
                error: None,
                duration_secs,
            };
        }

        let error = outcome
            .error
            .unwrap_or_else(|| "agent reported failure".to_string());
        warn!(task = %task.id, error = %error, "task failed");
        self.emit(CoordinatorEvent::TaskFailed {
            task_id: task.id.clone(),
            error: error.clone(),
        });
        self.notify_status(
            &task.id,
            &TaskStatus::Failed {
                error: error.clone(),
            },
        )
        .await;
        TaskResult {
            task_id: task.id.clone(),
            success: false,
            output: outcome.output,
            files_changed: outcome.files_changed,
            error: Some(error),
            duration_secs,
        }
    }

    fn emit(&self, event: CoordinatorEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Closed receivers are pruned.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn set_state(&self, state: RunState) {
        debug!(state = %state, "run state");
        self.state.send_replace(state);
    }

    async fn notify_status(&self, task_id: &TaskId, status: &TaskStatus) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.task_status(task_id, status).await {
                warn!(task = %task_id, error = %e, "progress sink rejected status update");
            }
        }
    }

    async fn report_progress(&self, progress: &Progress) {
        if let Some(sink) = &self.sink {
            let pct = percent(progress.completed, progress.total);
            if let Err(e) = sink.progress(progress.completed, progress.total, pct).await {
                warn!(error = %e, "progress sink rejected progress update");
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("registry", &self.registry)
            .field("has_sink", &self.sink.is_some())
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}
