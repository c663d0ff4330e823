//! Critical path analysis.
//!
//! The critical path is the dependency chain with the largest summed
//! estimated duration. It bounds the shortest possible run and is used for
//! reporting only; the phase scheduler does not consult it.

use crate::core::dag::DependencyGraph;
use crate::core::task::{Task, TaskId};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Longest duration-weighted dependency chain, first task first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CriticalPath {
    pub tasks: Vec<Task>,
    /// Minutes.
    pub duration: u64,
}

impl CriticalPath {
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl DependencyGraph {
    /// Compute the critical path.
    ///
    /// For every task, the heaviest chain ending at it is its own duration
    /// plus the heaviest chain among its dependencies. Tasks are visited in
    /// topological order so every dependency is settled first. Ties go to
    /// the dependency listed first and, overall, to the task listed first.
    ///
    /// # Errors
    /// Fails if the graph has a cycle.
    pub fn critical_path(&self) -> Result<CriticalPath> {
        let tasks = self.tasks();
        // best[i] = (weight of heaviest chain ending at i, predecessor on it)
        let mut best: Vec<Option<(u64, Option<usize>)>> = vec![None; tasks.len()];

        for i in self.topological_indices()? {
            let mut heaviest: Option<(u64, usize)> = None;
            for dep in self.resolved_dependencies(i) {
                if dep == i {
                    continue;
                }
                let Some((weight, _)) = best[dep] else {
                    continue;
                };
                if heaviest.map_or(true, |(w, _)| weight > w) {
                    heaviest = Some((weight, dep));
                }
            }
            best[i] = Some(match heaviest {
                Some((weight, dep)) => (
                    weight.saturating_add(tasks[i].estimated_duration),
                    Some(dep),
                ),
                None => (tasks[i].estimated_duration, None),
            });
        }

        let mut end: Option<(u64, usize)> = None;
        for (i, entry) in best.iter().enumerate() {
            if let Some((weight, _)) = entry {
                if end.map_or(true, |(w, _)| *weight > w) {
                    end = Some((*weight, i));
                }
            }
        }

        let Some((duration, last)) = end else {
            return Ok(CriticalPath::default());
        };

        let mut chain = Vec::new();
        let mut cursor = Some(last);
        while let Some(i) = cursor {
            chain.push(tasks[i].clone());
            cursor = best[i].and_then(|(_, prev)| prev);
        }
        chain.reverse();

        Ok(CriticalPath {
            tasks: chain,
            duration,
        })
    }
}
