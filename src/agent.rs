//! Agents: the external workers that carry out individual tasks.
//!
//! The coordinator only sees the [`Agent`] trait. How a worker gets its
//! job done is opaque; it receives a task and reports an [`AgentOutcome`].
//! [`CommandAgent`] is the stock implementation, running a configured
//! command line once per task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

use crate::config::{AgentCommand, Config};
use crate::core::task::Task;
use crate::{Error, Result};

/// Per-run context handed to every agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub working_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    /// Free-form values passed through to agents untouched.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            working_dir: working_dir.into(),
            started_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(".")
    }
}

/// What an agent reports back for one task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub success: bool,
    pub output: String,
    pub files_changed: Vec<String>,
    pub error: Option<String>,
}

impl AgentOutcome {
    pub fn success(output: impl Into<String>, files_changed: Vec<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            files_changed,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            files_changed: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// A worker able to carry out tasks of one agent type.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Carry out the task.
    ///
    /// `Err` is treated the same as an outcome with `success: false`.
    async fn handle(&self, task: &Task, ctx: &RunContext) -> Result<AgentOutcome>;
}

/// Agent instances keyed by the agent type they serve.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`CommandAgent`] per `[agents.<type>]` table in the config.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (agent_type, command) in &config.agents {
            registry.register(agent_type, Arc::new(CommandAgent::from_config(command)));
        }
        registry
    }

    /// Register an agent, replacing any previous one for the same type.
    pub fn register(&mut self, agent_type: &str, agent: Arc<dyn Agent>) {
        self.agents.insert(agent_type.to_string(), agent);
    }

    pub fn get(&self, agent_type: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_type).cloned()
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.agents.contains_key(agent_type)
    }

    /// Registered agent types, sorted.
    pub fn agent_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agent_types", &self.agent_types())
            .finish()
    }
}

/// Agent that runs an external command once per task.
///
/// The task id is appended as the last argument and the task's fields are
/// exported as `PHASEFLOW_*` environment variables. Exit status 0 is
/// success.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    base_command: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandAgent {
    pub fn new(command: &str) -> Self {
        Self {
            base_command: command.split_whitespace().map(String::from).collect(),
            timeout: None,
        }
    }

    pub fn from_config(config: &AgentCommand) -> Self {
        Self::new(&config.command).with_timeout(config.timeout_secs.map(Duration::from_secs))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> Option<&str> {
        self.base_command.first().map(String::as_str)
    }

    /// Full argument vector for a task.
    pub fn command(&self, task: &Task) -> Vec<String> {
        let mut cmd = self.base_command.clone();
        cmd.push(task.id.to_string());
        cmd
    }

    async fn run(&self, task: &Task, ctx: &RunContext) -> Result<AgentOutcome> {
        let Some((program, args)) = self.base_command.split_first() else {
            return Err(Error::Agent("empty agent command".to_string()));
        };
        debug!(task = %task.id, program = %program, "spawning agent command");

        let output = Command::new(program)
            .args(args)
            .arg(task.id.as_str())
            .current_dir(&ctx.working_dir)
            .env("PHASEFLOW_RUN_ID", ctx.run_id.to_string())
            .env("PHASEFLOW_TASK_ID", task.id.as_str())
            .env("PHASEFLOW_TASK_TITLE", &task.title)
            .env("PHASEFLOW_TASK_DESCRIPTION", &task.description)
            .env("PHASEFLOW_TASK_FILES", task.files_affected.join("\n"))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(AgentOutcome::success(
                String::from_utf8_lossy(&output.stdout).into_owned(),
                task.files_affected.clone(),
            ));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let error = if stderr.is_empty() {
            match output.status.code() {
                Some(code) => format!("agent exited with code {}", code),
                None => "agent terminated by signal".to_string(),
            }
        } else {
            stderr
        };
        Ok(AgentOutcome {
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            ..AgentOutcome::failure(error)
        })
    }
}

#[async_trait]
impl Agent for CommandAgent {
    async fn handle(&self, task: &Task, ctx: &RunContext) -> Result<AgentOutcome> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(task, ctx))
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => self.run(task, ctx).await,
        }
    }
}
