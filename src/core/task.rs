//! Task data model for the dependency graph.
//!
//! Tasks are the atomic units of schedulable work. A task names the agent
//! type that should carry it out, an estimated duration used only for
//! planning, the tasks it depends on, and the files it is going to write.

use serde::{Deserialize, Serialize};

/// Identifier of a task within one task set.
///
/// Ids are caller-supplied strings; uniqueness is checked by graph
/// validation rather than at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Task status during a coordinator run.
///
/// Tasks move through these states as the coordinator binds them to an
/// agent, dispatches them, and collects their outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Not yet reached by the coordinator.
    #[default]
    Pending,
    /// Bound to an agent instance, not yet dispatched.
    Assigned,
    /// Dispatched and awaiting the agent's outcome.
    Active,
    /// Agent reported success.
    Completed,
    /// Agent reported failure, or no agent could be bound.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
}

impl TaskStatus {
    /// Check if the status is terminal (Completed or Failed).
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Assigned => write!(f, "assigned"),
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
        }
    }
}

/// A single unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Human-readable name for the task.
    pub title: String,
    /// Detailed description of what the task should accomplish.
    #[serde(default)]
    pub description: String,
    /// Worker class that handles this task.
    #[serde(alias = "agentType")]
    pub agent_type: String,
    /// Estimated duration in minutes. Planning only, never enforced.
    #[serde(default, alias = "estimatedDuration")]
    pub estimated_duration: u64,
    /// Tasks that must complete before this one starts.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Paths this task will write.
    #[serde(default, alias = "filesAffected")]
    pub files_affected: Vec<String>,
}

impl Task {
    /// Create a task with no dependencies, no files and zero duration.
    ///
    /// The agent type defaults to `"general"`.
    pub fn new(id: impl Into<TaskId>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: title.to_string(),
            description: String::new(),
            agent_type: "general".to_string(),
            estimated_duration: 0,
            dependencies: Vec::new(),
            files_affected: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_agent(mut self, agent_type: &str) -> Self {
        self.agent_type = agent_type.to_string();
        self
    }

    /// Set the estimated duration in minutes.
    pub fn with_duration(mut self, minutes: u64) -> Self {
        self.estimated_duration = minutes;
        self
    }

    /// Add a dependency on another task.
    pub fn depends_on(mut self, id: impl Into<TaskId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Declare a file this task will write.
    pub fn touching(mut self, path: &str) -> Self {
        self.files_affected.push(path.to_string());
        self
    }

    /// Check whether this task writes any of the given files.
    pub fn conflicts_with(&self, other: &Task) -> bool {
        self.files_affected
            .iter()
            .any(|f| other.files_affected.contains(f))
    }
}
