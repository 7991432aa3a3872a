//! Pipeline stages and orchestration for Leadflow.
//!
//! Ties the lead store, content model and mail transport together into the
//! generate, dispatch and follow-up stages, and runs them end to end.

pub mod dispatch;
pub mod followup;
pub mod generate;
pub mod lock;
pub mod pipeline;
pub mod progress;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{DispatchOutcome, DispatchStats, Dispatcher, PREVIEW_PREFIX};
pub use generate::{GenerateStats, generate_pending};
pub use lock::RunLock;
pub use pipeline::{Pipeline, RunOutcome, RunSummary, StageReport, StageStatus};
pub use progress::{ProgressReporter, SilentProgress};
