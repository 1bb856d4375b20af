//! Error types for whiteboard-eval operations.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for whiteboard-eval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scanning, processing, or evaluating images.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Model identifier not present in the registry.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Registry definition is invalid (duplicate ids, empty, bad file).
    #[error("Registry error: {0}")]
    Registry(String),

    /// Failed to read an input image.
    #[error("Image load failed: {path}: {reason}")]
    ImageLoad {
        /// Path to the image that failed to load.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// Request rejected locally before reaching the remote service.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network-level failure talking to the remote service.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// HTTP status, if a response was received.
        status: Option<u16>,
    },

    /// The remote model rejected or failed the request.
    #[error("Inference failed ({model}): {message}")]
    Inference {
        /// Model identifier.
        model: String,
        /// Error message reported by the service.
        message: String,
    },

    /// The remote prediction did not reach a terminal state in time.
    #[error("Timed out after {waited:?} waiting for {model}")]
    Timeout {
        /// Model identifier.
        model: String,
        /// How long the client waited.
        waited: Duration,
    },

    /// Missing or rejected API credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Queue directory problem (missing root, unreadable folder).
    #[error("Queue error: {0}")]
    Queue(String),

    /// Failed to build a side-by-side comparison image.
    #[error("Composite error: {0}")]
    Composite(String),

    /// Error writing report files.
    #[error("Report error: {0}")]
    Report(String),

    /// I/O error wrapper.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image decode/encode error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Shorthand for a transport error without an HTTP status.
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Coarse classification used to group failures in run summaries.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownModel(_) => ErrorKind::UnknownModel,
            Self::ImageLoad { .. } | Self::Io(_) => ErrorKind::Io,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Inference { .. } => ErrorKind::Inference,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Authentication(_) => ErrorKind::Authentication,
            _ => ErrorKind::Other,
        }
    }

    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Whether the error means the environment is broken and the whole run must stop.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

/// Error classification recorded in processing results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownModel,
    Io,
    InvalidInput,
    Transport,
    Inference,
    Timeout,
    Authentication,
    Other,
}

impl ErrorKind {
    /// Kinds that abort a whole run rather than a single item.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Authentication)
    }

    /// Stable snake_case name, as used in CSV and text reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownModel => "unknown_model",
            Self::Io => "io",
            Self::InvalidInput => "invalid_input",
            Self::Transport => "transport",
            Self::Inference => "inference",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
