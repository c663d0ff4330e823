//! Phase-based task scheduling and execution.
//!
//! A set of [`Task`]s with declared dependencies and affected files is
//! turned into a [`DependencyGraph`], validated, partitioned into
//! conflict-free [`ExecutionPhase`]s and finally driven through registered
//! [`Agent`]s by the [`Coordinator`].

pub mod agent;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;

pub use agent::{Agent, AgentOutcome, AgentRegistry, CommandAgent, RunContext};
pub use config::Config;
pub use crate::core::{
    find_execution_phases, CriticalPath, DependencyGraph, ExecutionPhase, ExecutionPlan, Task,
    TaskId, TaskStatus, ValidationError, ValidationReport,
};
pub use error::{Error, Result};
pub use orchestration::{
    Coordinator, CoordinatorEvent, ProgressSink, RunResult, RunState, TaskResult,
};
