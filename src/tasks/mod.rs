//! Task tracking for background crew runs
//!
//! Registry of task records, the aggregator that applies step completions
//! to them, and the orchestrator that starts and seals runs.

pub mod aggregator;
pub mod orchestrator;
pub mod registry;
pub mod status;

pub use aggregator::{Aggregation, CallbackAggregator};
pub use orchestrator::{RunOrchestrator, CHIEF_COMPLAINT_INPUT};
pub use registry::TaskRegistry;
pub use status::{SubtaskStatus, TaskOutputEntry, TaskState, TaskStatus};
