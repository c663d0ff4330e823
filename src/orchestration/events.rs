//! Lifecycle notifications emitted by the coordinator.
//!
//! Events are advisory. Every subscriber gets each one, in order, at the
//! moment the coordinator reaches the corresponding point. Queues are
//! unbounded so a slow reader never loses events; a dropped receiver
//! never affects the run.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::task::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum CoordinatorEvent {
    #[serde(rename = "execution:started")]
    ExecutionStarted { run_id: Uuid, total_tasks: usize },
    #[serde(rename = "execution:completed")]
    ExecutionCompleted {
        run_id: Uuid,
        tasks_completed: usize,
        duration_secs: f64,
    },
    #[serde(rename = "execution:failed")]
    ExecutionFailed {
        run_id: Uuid,
        tasks_completed: usize,
        error: String,
    },
    #[serde(rename = "phase:started")]
    PhaseStarted {
        phase_number: usize,
        task_ids: Vec<TaskId>,
        parallel: bool,
    },
    #[serde(rename = "phase:completed")]
    PhaseCompleted {
        phase_number: usize,
        succeeded: usize,
        failed: usize,
        duration_secs: f64,
    },
    #[serde(rename = "task:assigned")]
    TaskAssigned { task_id: TaskId, agent_type: String },
    #[serde(rename = "task:started")]
    TaskStarted { task_id: TaskId, phase_number: usize },
    #[serde(rename = "task:completed")]
    TaskCompleted {
        task_id: TaskId,
        duration_secs: f64,
        files_changed: Vec<String>,
    },
    #[serde(rename = "task:failed")]
    TaskFailed { task_id: TaskId, error: String },
}

impl CoordinatorEvent {
    /// Stable event name, also used as the serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            CoordinatorEvent::ExecutionStarted { .. } => "execution:started",
            CoordinatorEvent::ExecutionCompleted { .. } => "execution:completed",
            CoordinatorEvent::ExecutionFailed { .. } => "execution:failed",
            CoordinatorEvent::PhaseStarted { .. } => "phase:started",
            CoordinatorEvent::PhaseCompleted { .. } => "phase:completed",
            CoordinatorEvent::TaskAssigned { .. } => "task:assigned",
            CoordinatorEvent::TaskStarted { .. } => "task:started",
            CoordinatorEvent::TaskCompleted { .. } => "task:completed",
            CoordinatorEvent::TaskFailed { .. } => "task:failed",
        }
    }

    /// The task this event is about, if any.
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            CoordinatorEvent::TaskAssigned { task_id, .. }
            | CoordinatorEvent::TaskStarted { task_id, .. }
            | CoordinatorEvent::TaskCompleted { task_id, .. }
            | CoordinatorEvent::TaskFailed { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    /// Check if this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorEvent::ExecutionCompleted { .. } | CoordinatorEvent::ExecutionFailed { .. }
        )
    }
}

impl std::fmt::Display for CoordinatorEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorEvent::ExecutionStarted { total_tasks, .. } => {
                write!(f, "{} ({} tasks)", self.name(), total_tasks)
            }
            CoordinatorEvent::ExecutionCompleted {
                tasks_completed,
                duration_secs,
                ..
            } => write!(
                f,
                "{} ({} tasks in {:.1}s)",
                self.name(),
                tasks_completed,
                duration_secs
            ),
            CoordinatorEvent::ExecutionFailed { error, .. } => {
                write!(f, "{}: {}", self.name(), error)
            }
            CoordinatorEvent::PhaseStarted {
                phase_number,
                task_ids,
                parallel,
            } => write!(
                f,
                "{} #{} ({} tasks{})",
                self.name(),
                phase_number,
                task_ids.len(),
                if *parallel { ", parallel" } else { "" }
            ),
            CoordinatorEvent::PhaseCompleted {
                phase_number,
                succeeded,
                failed,
                ..
            } => write!(
                f,
                "{} #{} ({} ok, {} failed)",
                self.name(),
                phase_number,
                succeeded,
                failed
            ),
            CoordinatorEvent::TaskAssigned {
                task_id,
                agent_type,
            } => write!(f, "{} {} -> {}", self.name(), task_id, agent_type),
            CoordinatorEvent::TaskStarted { task_id, .. } => {
                write!(f, "{} {}", self.name(), task_id)
            }
            CoordinatorEvent::TaskCompleted {
                task_id,
                duration_secs,
                ..
            } => write!(f, "{} {} ({:.1}s)", self.name(), task_id, duration_secs),
            CoordinatorEvent::TaskFailed { task_id, error } => {
                write!(f, "{} {}: {}", self.name(), task_id, error)
            }
        }
    }
}
