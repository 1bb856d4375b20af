//! Multi-model evaluation runs and their reports.
//!
//! - [`session::EvalSession`]: runs source images × models into a run directory
//! - [`session::EvalConfig`]: configuration for a run
//! - [`report`]: results, summaries and the run manifest
//! - [`composite`]: side-by-side comparison images

pub mod composite;
pub mod report;
pub mod session;

pub use report::{CompositeRecord, ItemStatus, ProcessingResult, RunManifest, RunSummary, WorkItem};
pub use session::{EvalConfig, EvalSession, plan};
