//! Project directory layout.
//!
//! Everything hangs off one project root:
//!
//! ```text
//! <root>/images/originals/queue/<batch>/<image>
//! <root>/images/originals/processed/<batch>/
//! <root>/images/enhanced/<batch>/<batch>-<stem>-<model>.png
//! <root>/eval/source/<image>
//! <root>/eval/runs/<run id>/
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pause between consecutive remote calls.
pub const DEFAULT_API_DELAY: Duration = Duration::from_secs(2);

/// Resolved directories for one project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Project root.
    pub root: PathBuf,
    /// Batch folders awaiting processing.
    pub queue_dir: PathBuf,
    /// Archived batch folders.
    pub processed_dir: PathBuf,
    /// Default-mode outputs.
    pub enhanced_dir: PathBuf,
    /// Evaluation source images.
    pub eval_source_dir: PathBuf,
    /// Evaluation run directories.
    pub runs_dir: PathBuf,
}

impl Workspace {
    /// Standard layout under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let originals = root.join("images").join("originals");
        Self {
            queue_dir: originals.join("queue"),
            processed_dir: originals.join("processed"),
            enhanced_dir: root.join("images").join("enhanced"),
            eval_source_dir: root.join("eval").join("source"),
            runs_dir: root.join("eval").join("runs"),
            root,
        }
    }

    /// Override the queue directory.
    #[must_use]
    pub fn with_queue_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.queue_dir = dir.into();
        self
    }

    /// Override the enhanced-output directory.
    #[must_use]
    pub fn with_enhanced_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.enhanced_dir = dir.into();
        self
    }

    /// Override the evaluation source directory.
    #[must_use]
    pub fn with_eval_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.eval_source_dir = dir.into();
        self
    }

    /// Override the runs directory.
    #[must_use]
    pub fn with_runs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runs_dir = dir.into();
        self
    }

    /// `.env` file at the project root.
    #[must_use]
    pub fn dotenv_path(&self) -> PathBuf {
        self.root.join(".env")
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(".")
    }
}
