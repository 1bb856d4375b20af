//! Output naming for the default and evaluation modes.
//!
//! Both layouts derive the output path only from the source image and the
//! model, so re-running the same inputs always targets the same file. The
//! source's stem and extension are kept as written: two images in one folder
//! never map to the same output. The two layouts live under different roots
//! and never share paths.

use std::path::{Path, PathBuf};

use crate::queue::ImageRef;
use crate::registry::ModelConfig;

/// Decides where the output for one (image, model) pair is written.
pub trait OutputNaming {
    /// Destination path for the output of `model` applied to `image`.
    fn output_path(&self, image: &ImageRef, model: &ModelConfig) -> PathBuf;
}

/// Lowercase, with spaces and underscores turned into dashes.
#[must_use]
pub fn clean_name(name: &str) -> String {
    name.trim().replace([' ', '_'], "-").to_lowercase()
}

/// Default-mode layout: `<root>/<folder>/<clean folder>-<stem>-<ext>-<model>.<format>`.
#[derive(Debug, Clone)]
pub struct EnhancedLayout {
    root: PathBuf,
}

impl EnhancedLayout {
    /// Layout rooted at the enhanced-output directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl OutputNaming for EnhancedLayout {
    fn output_path(&self, image: &ImageRef, model: &ModelConfig) -> PathBuf {
        let key = image.output_key();
        match image.folder() {
            Some(folder) => self.root.join(folder).join(format!(
                "{}-{}-{}.{}",
                clean_name(folder),
                key,
                model.id,
                model.output_format
            )),
            None => self
                .root
                .join(format!("{}-{}.{}", key, model.id, model.output_format)),
        }
    }
}

/// Evaluation layout: `<run dir>/<stem>-<ext>_<model>.<format>`, comparisons in a subfolder.
#[derive(Debug, Clone)]
pub struct RunLayout {
    run_dir: PathBuf,
}

impl RunLayout {
    /// Layout for one run directory.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    /// Run directory.
    #[must_use]
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Path of the side-by-side comparison image for a source.
    #[must_use]
    pub fn comparison_path(&self, image: &ImageRef) -> PathBuf {
        self.run_dir
            .join("comparisons")
            .join(format!("{}_comparison.png", image.output_key()))
    }
}

impl OutputNaming for RunLayout {
    fn output_path(&self, image: &ImageRef, model: &ModelConfig) -> PathBuf {
        self.run_dir.join(format!(
            "{}_{}.{}",
            image.output_key(),
            model.id,
            model.output_format
        ))
    }
}
