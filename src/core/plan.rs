//! Execution plan: the scheduled phases plus derived timing metrics.

use crate::core::dag::DependencyGraph;
use crate::core::phases::{find_execution_phases, ExecutionPhase};
use crate::core::task::TaskId;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Ordered phases for one scheduling run.
///
/// Phases run strictly in sequence, so `total_duration` is the sum of the
/// phase durations. `sequential_duration` is what running every task one
/// after another would take. Since a phase's duration is a max over its
/// members, `total_duration <= sequential_duration` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub phases: Vec<ExecutionPhase>,
    pub total_tasks: usize,
    /// Minutes.
    pub total_duration: u64,
    /// Minutes.
    pub sequential_duration: u64,
    /// Fraction of sequential time saved, in `[0, 1)`.
    pub parallelization_ratio: f64,
}

impl ExecutionPlan {
    /// Schedule the graph and derive the plan metrics.
    pub fn create(graph: &DependencyGraph) -> Result<Self> {
        Ok(Self::from_phases(find_execution_phases(graph)?))
    }

    /// Derive metrics for already scheduled phases.
    pub fn from_phases(phases: Vec<ExecutionPhase>) -> Self {
        let total_tasks = phases.iter().map(ExecutionPhase::len).sum();
        // Durations come straight from task files; saturate rather than wrap.
        let total_duration = phases
            .iter()
            .map(|p| p.estimated_duration)
            .fold(0, u64::saturating_add);
        let sequential_duration = phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .map(|t| t.estimated_duration)
            .fold(0, u64::saturating_add);

        let parallelization_ratio = if sequential_duration > 0 {
            1.0 - total_duration as f64 / sequential_duration as f64
        } else {
            0.0
        };

        Self {
            phases,
            total_tasks,
            total_duration,
            sequential_duration,
            parallelization_ratio,
        }
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Phase number (1-based) containing the given task.
    pub fn phase_of(&self, id: &TaskId) -> Option<usize> {
        self.phases
            .iter()
            .find(|p| p.contains(id))
            .map(|p| p.phase_number)
    }

    /// Largest number of tasks in any single phase.
    pub fn max_parallelism(&self) -> usize {
        self.phases.iter().map(ExecutionPhase::len).max().unwrap_or(0)
    }
}
