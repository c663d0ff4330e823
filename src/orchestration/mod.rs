//! Run orchestration: the coordinator, its lifecycle events and the
//! optional progress sink it reports to.

mod coordinator;
mod events;
mod sink;

pub use coordinator::{Coordinator, RunResult, RunState, TaskResult};
pub use events::CoordinatorEvent;
pub use sink::{percent, ProgressSink};
