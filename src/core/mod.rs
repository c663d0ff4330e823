//! Core domain models and planning algorithms.
//!
//! Everything in this module is pure: tasks, the dependency graph and its
//! validation, the phase scheduler, the execution plan, and critical path
//! analysis. Nothing here performs I/O or holds state across runs.

pub mod critical_path;
pub mod dag;
pub mod phases;
pub mod plan;
pub mod task;
pub mod validation;

pub use critical_path::CriticalPath;
pub use dag::DependencyGraph;
pub use phases::{find_execution_phases, ExecutionPhase};
pub use plan::ExecutionPlan;
pub use task::{Task, TaskId, TaskStatus};
pub use validation::{ValidationError, ValidationReport};
