use thiserror::Error;

use crate::core::task::TaskId;
use crate::core::validation::ValidationReport;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Invalid task graph: {0}")]
    InvalidGraph(ValidationReport),

    #[error("Circular dependency detected: no runnable tasks among {} pending", remaining.len())]
    SchedulingDeadlock { remaining: Vec<TaskId> },

    #[error("No agent registered for type '{agent_type}' (task {task_id})")]
    AgentNotRegistered { agent_type: String, task_id: TaskId },

    #[error("Execution already in progress")]
    AlreadyRunning,

    #[error("Task {task_id} failed: {error}")]
    TaskFailed { task_id: TaskId, error: String },

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, Error>;
