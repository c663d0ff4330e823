//! Task dependency graph.
//!
//! `DependencyGraph` is the immutable view the planner works on: the task
//! list in input order, each task's ordered dependency ids, and a petgraph
//! `DiGraph` over the edges that resolve to a known task. Building a graph
//! never fails. Unknown dependency ids are kept verbatim in the edge map
//! and only surface when the graph is validated.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use petgraph::algo::toposort;
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

/// The task dependency graph.
///
/// Node `i` of the underlying graph corresponds to `tasks()[i]`. An edge
/// `a -> b` means `a` must complete before `b` can start.
#[derive(Clone)]
pub struct DependencyGraph {
    /// Tasks in input order.
    tasks: Vec<Task>,
    /// Task id to its dependency ids, in the order the task lists them.
    edges: HashMap<TaskId, Vec<TaskId>>,
    /// Task id to position in `tasks`. First occurrence wins on duplicates.
    index: HashMap<TaskId, usize>,
    /// Resolved edges only, weighted by nothing.
    graph: DiGraph<usize, ()>,
}

impl DependencyGraph {
    /// Build the graph from a flat task list.
    pub fn build(tasks: Vec<Task>) -> Self {
        let mut index = HashMap::with_capacity(tasks.len());
        let mut edges = HashMap::with_capacity(tasks.len());
        let mut graph = DiGraph::with_capacity(tasks.len(), tasks.len());

        for (i, task) in tasks.iter().enumerate() {
            graph.add_node(i);
            index.entry(task.id.clone()).or_insert(i);
            edges
                .entry(task.id.clone())
                .or_insert_with(|| task.dependencies.clone());
        }

        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                if let Some(&j) = index.get(dep) {
                    graph.add_edge(NodeIndex::new(j), NodeIndex::new(i), ());
                }
            }
        }

        Self {
            tasks,
            edges,
            index,
            graph,
        }
    }

    /// All tasks in input order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// The id -> dependency ids map, including unresolved ids.
    pub fn edges(&self) -> &HashMap<TaskId, Vec<TaskId>> {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    /// Position of a task in `tasks()`.
    pub fn index_of(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.index_of(id).map(|i| &self.tasks[i])
    }

    /// Dependency ids of a task, in declaration order.
    pub fn dependencies(&self, id: &TaskId) -> Option<&[TaskId]> {
        self.edges.get(id).map(Vec::as_slice)
    }

    /// Positions of the resolvable dependencies of the task at `i`,
    /// in declaration order. Dangling ids are skipped.
    pub(crate) fn resolved_dependencies(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.tasks[i]
            .dependencies
            .iter()
            .filter_map(|dep| self.index.get(dep).copied())
    }

    /// Tasks that directly depend on the given task.
    pub fn dependents(&self, id: &TaskId) -> Vec<&Task> {
        let Some(i) = self.index_of(id) else {
            return Vec::new();
        };
        let mut found: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(i), Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect();
        // petgraph yields neighbors newest-edge first
        found.sort_unstable();
        found.dedup();
        found.into_iter().map(|j| &self.tasks[j]).collect()
    }

    /// Number of resolved dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Tasks ordered so every task follows all of its dependencies.
    ///
    /// # Errors
    /// Returns [`Error::SchedulingDeadlock`] naming the offending task if the
    /// resolved edges contain a cycle.
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|i| &self.tasks[i])
            .collect())
    }

    /// Task positions in topological order.
    pub(crate) fn topological_indices(&self) -> Result<Vec<usize>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| Error::SchedulingDeadlock {
            remaining: vec![self.tasks[self.graph[cycle.node_id()]].id.clone()],
        })?;
        Ok(sorted.into_iter().map(|n| self.graph[n]).collect())
    }

    /// Render the resolved edges as a Graphviz digraph labelled with task ids.
    pub fn to_dot(&self) -> String {
        let labelled = self
            .graph
            .map(|_, &i| self.tasks[i].id.to_string(), |_, _| "");
        format!("{}", Dot::with_config(&labelled, &[DotConfig::EdgeNoLabel]))
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
