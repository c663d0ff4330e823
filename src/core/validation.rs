//! Structural validation of a dependency graph.
//!
//! Every check accumulates into one report so a single call lists every
//! defect: duplicate ids, self-dependencies, dangling references and
//! cycles. A graph with any error must not be scheduled.

use crate::core::dag::DependencyGraph;
use crate::core::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single structural defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValidationError {
    /// Two or more tasks share an id.
    DuplicateTask { task: TaskId },
    /// A task lists its own id as a dependency.
    SelfDependency { task: TaskId },
    /// A dependency id names no task in the graph.
    MissingDependency { task: TaskId, dependency: TaskId },
    /// A dependency cycle; the first and last ids are the same task.
    Cycle { path: Vec<TaskId> },
}

impl ValidationError {
    /// Tasks named by this error.
    pub fn tasks(&self) -> Vec<&TaskId> {
        match self {
            ValidationError::DuplicateTask { task } | ValidationError::SelfDependency { task } => {
                vec![task]
            }
            ValidationError::MissingDependency { task, .. } => vec![task],
            ValidationError::Cycle { path } => path.iter().collect(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DuplicateTask { task } => {
                write!(f, "Duplicate task id: {}", task)
            }
            ValidationError::SelfDependency { task } => {
                write!(f, "Task {} depends on itself", task)
            }
            ValidationError::MissingDependency { task, dependency } => {
                write!(f, "Task {} depends on non-existent task {}", task, dependency)
            }
            ValidationError::Cycle { path } => {
                let joined: Vec<&str> = path.iter().map(TaskId::as_str).collect();
                write!(f, "Circular dependency detected: {}", joined.join(" -> "))
            }
        }
    }
}

/// Outcome of validating a graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn has_cycle(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, ValidationError::Cycle { .. }))
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "valid");
        }
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

impl DependencyGraph {
    /// Check the graph is a well-formed DAG.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut seen = HashSet::with_capacity(self.len());

        for task in self.tasks() {
            if !seen.insert(&task.id) {
                errors.push(ValidationError::DuplicateTask {
                    task: task.id.clone(),
                });
            }
        }

        for task in self.tasks() {
            for dep in &task.dependencies {
                if *dep == task.id {
                    errors.push(ValidationError::SelfDependency {
                        task: task.id.clone(),
                    });
                } else if !self.contains_task(dep) {
                    errors.push(ValidationError::MissingDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        errors.extend(self.find_cycles());
        ValidationReport::from_errors(errors)
    }

    /// Depth-first search along dependency edges with an explicit stack.
    ///
    /// A node reached while it is still on the stack closes a cycle. Self
    /// edges and dangling ids are skipped; they are reported separately.
    fn find_cycles(&self) -> Vec<ValidationError> {
        let tasks = self.tasks();
        let mut marks = vec![Mark::Unvisited; tasks.len()];
        let mut cycles = Vec::new();
        // (node, resolved dependencies, next dependency to explore)
        let mut stack: Vec<(usize, Vec<usize>, usize)> = Vec::new();

        for root in 0..tasks.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::OnStack;
            stack.push((root, self.resolved_dependencies(root).collect(), 0));

            while let Some((node, deps, next)) = stack.last_mut() {
                let node = *node;
                let Some(&dep) = deps.get(*next) else {
                    marks[node] = Mark::Done;
                    stack.pop();
                    continue;
                };
                *next += 1;

                if dep == node {
                    continue;
                }
                match marks[dep] {
                    Mark::Unvisited => {
                        marks[dep] = Mark::OnStack;
                        stack.push((dep, self.resolved_dependencies(dep).collect(), 0));
                    }
                    Mark::OnStack => {
                        let start = stack
                            .iter()
                            .position(|(n, _, _)| *n == dep)
                            .unwrap_or(0);
                        let mut path: Vec<TaskId> = stack[start..]
                            .iter()
                            .map(|(n, _, _)| tasks[*n].id.clone())
                            .collect();
                        path.push(tasks[dep].id.clone());
                        cycles.push(ValidationError::Cycle { path });
                    }
                    Mark::Done => {}
                }
            }
        }

        cycles
    }
}
