//! Result and manifest types for processing runs.
//!
//! These are serialized to JSON (`manifest.json`), CSV (`results.csv`) and a
//! plain-text log (`results.txt`) inside each run directory.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::queue::ImageRef;

/// One (image, model) pair awaiting processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Source image.
    pub image: ImageRef,
    /// Model identifier to apply.
    pub model: String,
}

impl WorkItem {
    /// Pair an image with a model identifier.
    pub fn new(image: ImageRef, model: impl Into<String>) -> Self {
        Self {
            image,
            model: model.into(),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} + {}", self.image, self.model)
    }
}

/// Outcome of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl ItemStatus {
    /// Lowercase name for reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Why a work item failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&Error> for FailureRecord {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Result of processing one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// The work item this result belongs to.
    pub item: WorkItem,

    /// Outcome.
    pub status: ItemStatus,

    /// Output file (success, or skipped because it already existed).
    pub output: Option<PathBuf>,

    /// Output size in bytes on success.
    pub output_bytes: Option<u64>,

    /// Checksum of the source file contents.
    pub source_checksum: Option<String>,

    /// Failure details.
    pub failure: Option<FailureRecord>,

    /// Wall-clock time spent on the item.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl ProcessingResult {
    /// Successful result.
    #[must_use]
    pub fn succeeded(item: WorkItem, output: PathBuf, output_bytes: u64) -> Self {
        Self {
            item,
            status: ItemStatus::Succeeded,
            output: Some(output),
            output_bytes: Some(output_bytes),
            source_checksum: None,
            failure: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Failed result.
    #[must_use]
    pub fn failed(item: WorkItem, error: &Error) -> Self {
        Self {
            item,
            status: ItemStatus::Failed,
            output: None,
            output_bytes: None,
            source_checksum: None,
            failure: Some(FailureRecord::from(error)),
            elapsed: Duration::ZERO,
        }
    }

    /// Skipped result: output already present.
    #[must_use]
    pub fn skipped(item: WorkItem, existing: PathBuf) -> Self {
        Self {
            item,
            status: ItemStatus::Skipped,
            output: Some(existing),
            output_bytes: None,
            source_checksum: None,
            failure: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Whether the item succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ItemStatus::Succeeded
    }

    /// Error kind of a failure.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

/// Counts of outcomes, with failures grouped by error kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Failure messages grouped by kind.
    pub failures: BTreeMap<ErrorKind, Vec<String>>,
}

impl RunSummary {
    /// Summarize a list of results.
    #[must_use]
    pub fn from_results(results: &[ProcessingResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.status {
                ItemStatus::Succeeded => summary.succeeded += 1,
                ItemStatus::Skipped => summary.skipped += 1,
                ItemStatus::Failed => {
                    summary.failed += 1;
                    let (kind, message) = result
                        .failure
                        .as_ref()
                        .map_or((ErrorKind::Other, String::new()), |f| (f.kind, f.message.clone()));
                    summary
                        .failures
                        .entry(kind)
                        .or_default()
                        .push(format!("{}: {}", result.item, message));
                }
            }
        }
        summary
    }

    /// Total number of items.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Items were attempted and none succeeded.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.succeeded == 0 && self.skipped == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Total: {} | succeeded: {} | failed: {} | skipped: {}",
            self.total(),
            self.succeeded,
            self.failed,
            self.skipped
        )?;
        for (kind, messages) in &self.failures {
            writeln!(f, "  {} ({}):", kind, messages.len())?;
            for message in messages {
                writeln!(f, "    {message}")?;
            }
        }
        Ok(())
    }
}

/// Side-by-side comparison image for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeRecord {
    /// Source image.
    pub source: ImageRef,
    /// Written composite, if any model succeeded.
    pub path: Option<PathBuf>,
    /// Models shown, left to right.
    pub included: Vec<String>,
    /// Models left out because they failed for this source.
    pub skipped: Vec<String>,
    /// Why the comparison could not be written.
    #[serde(default)]
    pub error: Option<String>,
}

impl CompositeRecord {
    /// Record for a source with nothing composed yet.
    #[must_use]
    pub fn new(source: ImageRef) -> Self {
        Self {
            source,
            path: None,
            included: Vec::new(),
            skipped: Vec::new(),
            error: None,
        }
    }

    /// Record for a comparison that failed to build.
    #[must_use]
    pub fn failed(source: ImageRef, error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(source)
        }
    }
}

/// Record of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Run identifier (local timestamp captured at start).
    pub id: String,

    /// Directory holding this run's outputs.
    pub run_dir: PathBuf,

    /// Prompt sent with every request.
    pub prompt: String,

    /// Models evaluated, in order.
    pub models: Vec<String>,

    /// Source images, in order.
    pub sources: Vec<ImageRef>,

    /// Results in processing order.
    pub results: Vec<ProcessingResult>,

    /// Comparison images.
    #[serde(default)]
    pub composites: Vec<CompositeRecord>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished; absent for an interrupted run.
    pub finished_at: Option<DateTime<Utc>>,

    /// Reason the run stopped early.
    #[serde(default)]
    pub aborted: Option<String>,
}

impl RunManifest {
    /// Start a new manifest.
    #[must_use]
    pub fn new(
        id: String,
        run_dir: PathBuf,
        prompt: String,
        models: Vec<String>,
        sources: Vec<ImageRef>,
    ) -> Self {
        Self {
            id,
            run_dir,
            prompt,
            models,
            sources,
            results: Vec::new(),
            composites: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            aborted: None,
        }
    }

    /// Append a result.
    pub fn push(&mut self, result: ProcessingResult) {
        self.results.push(result);
    }

    /// Results for one source image, in model order.
    pub fn results_for<'a>(
        &'a self,
        source: &'a ImageRef,
    ) -> impl Iterator<Item = &'a ProcessingResult> {
        self.results.iter().filter(move |r| &r.item.image == source)
    }

    /// Outcome counts.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }

    /// Load a manifest from JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `manifest.json` into the run directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = self.run_dir.join("manifest.json");
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }

    /// Write `results.csv` into the run directory.
    pub fn write_csv(&self) -> Result<PathBuf> {
        let path = self.run_dir.join("results.csv");
        let mut wtr = csv::Writer::from_path(&path)?;

        wtr.write_record([
            "image",
            "model",
            "status",
            "error_kind",
            "output",
            "output_bytes",
            "elapsed_ms",
            "source_checksum",
        ])?;

        for result in &self.results {
            let output = result.output.as_deref();
            wtr.write_record([
                result.item.image.file_name().to_string(),
                result.item.model.clone(),
                result.status.as_str().to_string(),
                result.error_kind().map_or(String::new(), |k| k.to_string()),
                output.map_or(String::new(), |p| p.display().to_string()),
                result.output_bytes.map_or(String::new(), |b| b.to_string()),
                result.elapsed.as_millis().to_string(),
                result.source_checksum.clone().unwrap_or_default(),
            ])?;
        }

        wtr.flush()?;
        Ok(path)
    }

    /// Write the human-readable `results.txt` log.
    pub fn write_log(&self) -> Result<PathBuf> {
        let path = self.run_dir.join("results.txt");
        let mut out = Vec::new();

        writeln!(out, "Evaluation Run: {}", self.id)?;
        writeln!(out, "Prompt:\n{}\n", self.prompt)?;
        writeln!(out, "Results:")?;
        for result in &self.results {
            match &result.failure {
                Some(failure) => writeln!(
                    out,
                    "  {} + {}: {} ({})",
                    result.item.image.file_name(),
                    result.item.model,
                    result.status.as_str(),
                    failure.kind
                )?,
                None => writeln!(
                    out,
                    "  {} + {}: {}",
                    result.item.image.file_name(),
                    result.item.model,
                    result.status.as_str()
                )?,
            }
        }

        if !self.composites.is_empty() {
            writeln!(out, "\nComparisons:")?;
            for composite in &self.composites {
                if let Some(error) = &composite.error {
                    writeln!(out, "  {}: failed ({error})", composite.source.file_name())?;
                    continue;
                }
                let skipped = if composite.skipped.is_empty() {
                    String::new()
                } else {
                    format!(" (skipped: {})", composite.skipped.join(", "))
                };
                writeln!(
                    out,
                    "  {}: {}{}",
                    composite.source.file_name(),
                    composite.included.join(" | "),
                    skipped
                )?;
            }
        }

        writeln!(out, "\n{}", self.summary())?;
        if let Some(reason) = &self.aborted {
            writeln!(out, "Aborted: {reason}")?;
        }

        write_atomic(&path, &out)?;
        Ok(path)
    }
}

/// Write a file via a temporary sibling and rename it into place.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Report(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(image: &str, model: &str) -> WorkItem {
        WorkItem::new(ImageRef::new(format!("/src/{image}")), model)
    }

    fn failure(image: &str, model: &str, error: Error) -> ProcessingResult {
        ProcessingResult::failed(item(image, model), &error)
    }

    fn rejected(model: &str, message: &str) -> Error {
        Error::Inference {
            model: model.into(),
            message: message.into(),
        }
    }

    #[test]
    fn test_summary_groups_failures_by_kind() {
        let results = vec![
            ProcessingResult::succeeded(item("a.png", "m1"), "/out/a_m1.png".into(), 10),
            failure("a.png", "m2", rejected("m2", "nsfw")),
            failure("b.png", "m2", rejected("m2", "oom")),
            failure("b.png", "m3", Error::UnknownModel("m3".into())),
            ProcessingResult::skipped(item("c.png", "m1"), "/out/c_m1.png".into()),
        ];

        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.failures[&ErrorKind::Inference].len(), 2);
        assert_eq!(summary.failures[&ErrorKind::UnknownModel].len(), 1);
        assert!(!summary.all_failed());

        let text = summary.to_string();
        assert!(text.contains("failed: 3"));
        assert!(text.contains("inference (2):"));
    }

    #[test]
    fn test_all_failed() {
        let results = vec![failure("a.png", "m1", Error::transport("reset"))];
        assert!(RunSummary::from_results(&results).all_failed());
        assert!(!RunSummary::default().all_failed());
    }

    #[test]
    fn test_manifest_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = ImageRef::new("/src/a.png");
        let mut manifest = RunManifest::new(
            "20250101-120000".into(),
            dir.path().to_path_buf(),
            "prompt text".into(),
            vec!["m1".into(), "m2".into()],
            vec![source.clone()],
        );
        let output = dir.path().join("a_m1.png");
        manifest.push(ProcessingResult::succeeded(item("a.png", "m1"), output, 5));
        let timeout = Error::Timeout {
            model: "m2".into(),
            waited: Duration::from_secs(3),
        };
        manifest.push(failure("a.png", "m2", timeout));
        manifest.composites.push(CompositeRecord {
            source,
            path: Some(dir.path().join("comparisons/a_comparison.png")),
            included: vec!["m1".into()],
            skipped: vec!["m2".into()],
            error: None,
        });

        let json_path = manifest.save().unwrap();
        let loaded = RunManifest::load(&json_path).unwrap();
        assert_eq!(loaded.results.len(), 2);
        assert_eq!(loaded.results[1].error_kind(), Some(ErrorKind::Timeout));
        assert_eq!(loaded.composites[0].skipped, vec!["m2".to_string()]);

        let csv_path = manifest.write_csv().unwrap();
        let csv = std::fs::read_to_string(csv_path).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.contains("a.png,m2,failed,timeout"));

        let log = std::fs::read_to_string(manifest.write_log().unwrap()).unwrap();
        assert!(log.starts_with("Evaluation Run: 20250101-120000"));
        assert!(log.contains("  a.png + m1: succeeded"));
        assert!(log.contains("  a.png + m2: failed (timeout)"));
        assert!(log.contains("a.png: m1 (skipped: m2)"));
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
