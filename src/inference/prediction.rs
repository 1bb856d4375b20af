//! Wire types for Replicate predictions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    /// Whether polling can stop.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Follow-up URLs returned with a prediction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
    pub cancel: Option<String>,
}

/// A prediction as returned by the create and get endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

impl Prediction {
    /// First output file URL.
    ///
    /// Models return either a single URL or a list of URLs.
    #[must_use]
    pub fn output_url(&self) -> Option<&str> {
        self.output.as_ref().and_then(first_url)
    }

    /// Error text reported by the service, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

fn first_url(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if s.starts_with("http") => Some(s),
        Value::Array(items) => items.iter().find_map(first_url),
        Value::Object(map) => map.get("url").and_then(first_url),
        _ => None,
    }
}
