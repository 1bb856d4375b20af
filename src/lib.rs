//! # whiteboard-eval
//!
//! Whiteboard photo cleanup through hosted image-editing models.
//!
//! Photos are sent to a remote model on Replicate together with a cleanup
//! prompt; the returned image is saved next to its siblings under a
//! predictable name. Two modes share the same processor:
//!
//! - **default mode** ([`batch::BatchRunner`]): every pending image in the
//!   queue through one model, skipping images that already have output
//! - **evaluation mode** ([`eval::EvalSession`]): every source image through
//!   several models, with a manifest and side-by-side comparisons per run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use whiteboard_eval::{
//!     EvalConfig, EvalSession, ModelRegistry, Prompt, ReplicateClient, ClientConfig, Workspace,
//! };
//!
//! let workspace = Workspace::new(".");
//! let registry = ModelRegistry::builtin();
//! let client = ReplicateClient::from_env(ClientConfig::default())?;
//!
//! let config = EvalConfig::builder().runs_dir(&workspace.runs_dir).build();
//! let session = EvalSession::new(config, &registry, &client, &Prompt::default());
//!
//! let sources = whiteboard_eval::queue::list_images(&workspace.eval_source_dir)?;
//! let manifest = session.run_evaluation(&sources, &["nano-banana", "flux-kontext-pro"])?;
//! println!("{}", manifest.summary());
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: model identifiers and their remote endpoint configuration
//! - [`inference`]: the [`Transformer`] seam and the Replicate client
//! - [`queue`]: batch folder discovery
//! - [`processor`]: one image through one model
//! - [`batch`]: default mode
//! - [`eval`]: evaluation runs, reports and comparison images

pub mod batch;
pub mod config;
pub mod error;
pub mod eval;
pub mod inference;
pub mod layout;
pub mod processor;
pub mod prompt;
pub mod queue;
pub mod registry;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use batch::{BatchOptions, BatchReport, BatchRunner};
pub use config::Workspace;
pub use error::{Error, ErrorKind, Result};
pub use eval::{
    report::{ProcessingResult, RunManifest, RunSummary, WorkItem},
    session::{EvalConfig, EvalSession},
};
pub use inference::{ApiToken, ClientConfig, ReplicateClient, RetryPolicy, Transformer};
pub use layout::{EnhancedLayout, OutputNaming, RunLayout};
pub use processor::Processor;
pub use prompt::Prompt;
pub use queue::{ImageRef, Queue};
pub use registry::{ModelConfig, ModelRegistry};

