//! Phase scheduling.
//!
//! Greedy topological leveling with a file-conflict constraint. Each pass
//! collects the tasks whose dependencies are all complete, walks them in
//! input order and admits every task whose `files_affected` do not overlap
//! the files already claimed in this phase. Rejected tasks stay ready and
//! are retried in the next phase. Same input order gives the same phases.

use crate::core::dag::DependencyGraph;
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// One group of tasks that runs to completion before the next group starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// 1-based position in the plan.
    pub phase_number: usize,
    /// Tasks in input order.
    pub tasks: Vec<Task>,
    /// Longest estimated duration among the phase's tasks, in minutes.
    pub estimated_duration: u64,
    /// True iff the phase holds more than one task.
    pub can_run_in_parallel: bool,
}

impl ExecutionPhase {
    fn new(phase_number: usize, tasks: Vec<Task>) -> Self {
        let estimated_duration = tasks
            .iter()
            .map(|t| t.estimated_duration)
            .max()
            .unwrap_or(0);
        let can_run_in_parallel = tasks.len() > 1;
        Self {
            phase_number,
            tasks,
            estimated_duration,
            can_run_in_parallel,
        }
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.iter().any(|t| &t.id == id)
    }
}

/// Partition the graph into dependency-respecting, conflict-free phases.
///
/// The graph should have passed [`DependencyGraph::validate`] first.
///
/// # Errors
/// Returns [`Error::SchedulingDeadlock`] if tasks remain but none are
/// runnable, which only happens on a graph with a cycle or a dangling
/// dependency.
pub fn find_execution_phases(graph: &DependencyGraph) -> Result<Vec<ExecutionPhase>> {
    let tasks = graph.tasks();

    // pending[i] counts listed dependencies not yet completed. Dangling
    // and self dependencies are never released, so such tasks never run.
    let mut pending: Vec<usize> = tasks.iter().map(|t| t.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            if let Some(j) = graph.index_of(dep) {
                dependents[j].push(i);
            }
        }
    }

    let mut completed = vec![false; tasks.len()];
    let mut completed_count = 0;
    // Ready tasks in input order, including those deferred by a conflict.
    let mut ready: Vec<usize> = (0..tasks.len()).filter(|&i| pending[i] == 0).collect();
    let mut phases = Vec::new();
    let mut phase_number = 1;

    while completed_count < tasks.len() {
        if ready.is_empty() {
            let remaining = (0..tasks.len())
                .filter(|&i| !completed[i])
                .map(|i| tasks[i].id.clone())
                .collect();
            return Err(Error::SchedulingDeadlock { remaining });
        }

        let mut used_files: HashSet<&str> = HashSet::new();
        let mut admitted = Vec::with_capacity(ready.len());
        let mut deferred = Vec::new();
        for i in ready {
            let files = &tasks[i].files_affected;
            if files.iter().any(|f| used_files.contains(f.as_str())) {
                debug!(
                    task = %tasks[i].id,
                    phase = phase_number,
                    "deferring task with file conflict"
                );
                deferred.push(i);
                continue;
            }
            used_files.extend(files.iter().map(String::as_str));
            admitted.push(i);
        }

        let mut released = Vec::new();
        for &i in &admitted {
            completed[i] = true;
            for &d in &dependents[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    released.push(d);
                }
            }
        }
        completed_count += admitted.len();

        deferred.extend(released);
        deferred.sort_unstable();
        ready = deferred;

        let phase = ExecutionPhase::new(
            phase_number,
            admitted.into_iter().map(|i| tasks[i].clone()).collect(),
        );
        debug!(
            phase = phase.phase_number,
            tasks = phase.len(),
            duration = phase.estimated_duration,
            "scheduled phase"
        );
        phases.push(phase);
        phase_number += 1;
    }

    Ok(phases)
}
