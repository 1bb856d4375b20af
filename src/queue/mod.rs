//! Input queue: one folder per batch of whiteboard photos.
//!
//! ```text
//! queue/
//!   architecture-review/
//!     IMG_0001.jpg
//!     IMG_0002.jpg
//!   standup/
//!     board.png
//! ```
//!
//! Scans are deterministic: folders by name, then images by file name.
//!
//! ## Example
//!
//! ```rust,ignore
//! use whiteboard_eval::queue::Queue;
//! use whiteboard_eval::layout::EnhancedLayout;
//!
//! let queue = Queue::open("images/originals/queue")?;
//! let report = queue.scan_pending(&EnhancedLayout::new("images/enhanced"), model)?;
//! for image in &report.pending {
//!     println!("{}", image.path().display());
//! }
//! ```

mod discovery;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use discovery::{SUPPORTED_EXTENSIONS, content_checksum, has_image_extension, list_images};

use crate::error::{Error, Result};
use crate::layout::OutputNaming;
use crate::registry::ModelConfig;

/// Reference to one input image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    path: PathBuf,
    folder: Option<String>,
}

impl ImageRef {
    /// Reference an image; the batch folder is the name of its parent directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let folder = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|s| s.to_str())
            .map(str::to_string);
        Self { path, folder }
    }

    /// Full path to the image.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Batch folder name.
    #[must_use]
    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    /// File name including extension.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.path.file_name().and_then(|s| s.to_str()).unwrap_or("")
    }

    /// File name without extension.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("")
    }

    /// Extension as written, without the dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        self.path.extension().and_then(|s| s.to_str()).unwrap_or("")
    }

    /// Name used to derive output files: `<stem>-<extension>`.
    ///
    /// Distinct file names in one directory always give distinct keys, so
    /// `board.jpg` and `board.png` never share an output.
    #[must_use]
    pub fn output_key(&self) -> String {
        match self.extension() {
            "" => self.stem().to_string(),
            ext => format!("{}-{}", self.stem(), ext),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.folder {
            Some(folder) => write!(f, "{}/{}", folder, self.file_name()),
            None => f.write_str(self.file_name()),
        }
    }
}

/// Non-fatal problem found while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    /// A batch folder with no valid images.
    EmptyFolder { folder: PathBuf },
    /// A file or folder that could not be read or is not an image.
    Unreadable { path: PathBuf, reason: String },
    /// A file placed directly in the queue root instead of a batch folder.
    LooseFile { path: PathBuf },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyFolder { folder } => {
                write!(f, "no images found in {}", folder.display())
            }
            Self::Unreadable { path, reason } => {
                write!(f, "skipping {}: {}", path.display(), reason)
            }
            Self::LooseFile { path } => {
                write!(f, "ignoring {} (not inside a batch folder)", path.display())
            }
        }
    }
}

/// One batch folder and its valid images.
#[derive(Debug, Clone)]
pub struct QueueFolder {
    /// Folder name.
    pub name: String,
    /// Folder path.
    pub path: PathBuf,
    /// Valid images, sorted by file name.
    pub images: Vec<ImageRef>,
}

/// Result of scanning the whole queue.
#[derive(Debug, Clone, Default)]
pub struct QueueScan {
    /// Folders holding at least one valid image, sorted by name.
    pub folders: Vec<QueueFolder>,
    /// Problems that did not stop the scan.
    pub warnings: Vec<ScanWarning>,
}

impl QueueScan {
    /// All images in processing order.
    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.folders.iter().flat_map(|f| f.images.iter())
    }

    /// Keep only the named folder.
    #[must_use]
    pub fn only_folder(mut self, name: &str) -> Self {
        self.folders.retain(|f| f.name == name);
        self
    }
}

/// Pending work for one model.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Images without output yet, in processing order.
    pub pending: Vec<ImageRef>,
    /// Images whose output already exists.
    pub completed: Vec<ImageRef>,
    /// Problems that did not stop the scan.
    pub warnings: Vec<ScanWarning>,
}

impl ScanReport {
    /// Split a queue scan into pending and completed images.
    pub fn from_scan(scan: QueueScan, layout: &dyn OutputNaming, model: &ModelConfig) -> Self {
        let mut report = Self {
            warnings: scan.warnings.clone(),
            ..Self::default()
        };
        for image in scan.images() {
            if layout.output_path(image, model).exists() {
                report.completed.push(image.clone());
            } else {
                report.pending.push(image.clone());
            }
        }
        report
    }
}

/// Queue directory handle.
#[derive(Debug, Clone)]
pub struct Queue {
    root: PathBuf,
}

impl Queue {
    /// Open a queue directory.
    ///
    /// A missing root is an environment problem and fails immediately.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::Queue(format!(
                "Queue directory not found: {}",
                root.display()
            )));
        }
        if !root.is_dir() {
            return Err(Error::Queue(format!(
                "Queue path is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Queue root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Batch folders holding at least one valid image, sorted by name.
    pub fn folders(&self) -> Result<Vec<QueueFolder>> {
        Ok(self.scan()?.folders)
    }

    /// Scan every batch folder.
    pub fn scan(&self) -> Result<QueueScan> {
        let mut scan = QueueScan::default();

        for path in discovery::sorted_entries(&self.root)? {
            let utf8 = path.file_name().and_then(|s| s.to_str());
            let Some(name) = utf8.map(str::to_string) else {
                scan.warnings.push(ScanWarning::Unreadable {
                    path,
                    reason: "name is not valid UTF-8".to_string(),
                });
                continue;
            };

            if name.starts_with('.') {
                continue;
            }

            if path.is_file() {
                if has_image_extension(&path) {
                    scan.warnings.push(ScanWarning::LooseFile { path });
                }
                continue;
            }

            if !path.is_dir() {
                continue;
            }

            let images = match discovery::scan_folder(&path, &mut scan.warnings) {
                Ok(images) => images,
                Err(e) => {
                    scan.warnings.push(ScanWarning::Unreadable {
                        path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if images.is_empty() {
                let warning = ScanWarning::EmptyFolder { folder: path };
                scan.warnings.push(warning);
                continue;
            }

            scan.folders.push(QueueFolder { name, path, images });
        }

        for warning in &scan.warnings {
            warn!("{warning}");
        }

        Ok(scan)
    }

    /// Images that have no output for `model` yet.
    pub fn scan_pending(
        &self,
        layout: &dyn OutputNaming,
        model: &ModelConfig,
    ) -> Result<ScanReport> {
        Ok(ScanReport::from_scan(self.scan()?, layout, model))
    }

    /// Move a finished batch folder into `processed_root`.
    ///
    /// If the destination exists, a timestamp suffix is appended.
    pub fn archive_folder(&self, folder: &QueueFolder, processed_root: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(processed_root)?;

        let mut destination = processed_root.join(&folder.name);
        if destination.exists() {
            let timestamp = Local::now().format("%Y%m%d-%H%M%S");
            destination = processed_root.join(format!("{}-{}", folder.name, timestamp));
        }

        std::fs::rename(&folder.path, &destination)?;
        info!(from = %folder.path.display(), to = %destination.display(), "archived folder");
        Ok(destination)
    }
}
