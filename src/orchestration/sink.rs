//! Optional persistence/telemetry hook.
//!
//! The coordinator reports task status transitions and overall progress to
//! a [`ProgressSink`] when one is attached. Errors returned by the sink are
//! logged and otherwise ignored.

use async_trait::async_trait;

use crate::core::task::{TaskId, TaskStatus};
use crate::Result;

#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// A task moved to a new status.
    async fn task_status(&self, task_id: &TaskId, status: &TaskStatus) -> Result<()>;

    /// Overall progress after a phase settles. `percent` is in `[0, 100]`.
    async fn progress(&self, completed: usize, total: usize, percent: f64) -> Result<()>;
}

/// Percentage of `completed` over `total`; 100 for an empty run.
pub fn percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 * 100.0 / total as f64
}
