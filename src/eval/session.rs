//! Evaluation session: every source image through every selected model.
//!
//! Work items are the cross product of sources × models, outer loop over
//! sources, inner loop over models, both in caller order. Items run one at a
//! time; each run gets its own timestamped directory under the runs root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::eval::composite::{self, DEFAULT_TILE_HEIGHT};
use crate::eval::report::{CompositeRecord, RunManifest, WorkItem};
use crate::inference::Transformer;
use crate::layout::RunLayout;
use crate::processor::Processor;
use crate::prompt::Prompt;
use crate::queue::ImageRef;
use crate::registry::ModelRegistry;

/// Configuration for an evaluation session.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Directory that receives one subdirectory per run.
    pub runs_dir: PathBuf,

    /// Pause between remote calls.
    pub api_delay: Duration,

    /// Whether to build side-by-side comparisons.
    pub composite: bool,

    /// Height of each tile in a comparison image.
    pub tile_height: u32,

    /// Fixed run identifier instead of the start timestamp.
    pub run_id: Option<String>,
}

impl EvalConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> EvalConfigBuilder {
        EvalConfigBuilder::default()
    }
}

/// Builder for [`EvalConfig`].
#[derive(Debug, Default)]
pub struct EvalConfigBuilder {
    runs_dir: Option<PathBuf>,
    api_delay: Option<Duration>,
    composite: Option<bool>,
    tile_height: Option<u32>,
    run_id: Option<String>,
}

impl EvalConfigBuilder {
    /// Set the runs directory.
    #[must_use]
    pub fn runs_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.runs_dir = Some(path.into());
        self
    }

    /// Set the pause between remote calls.
    #[must_use]
    pub fn api_delay(mut self, delay: Duration) -> Self {
        self.api_delay = Some(delay);
        self
    }

    /// Enable or disable comparison images.
    #[must_use]
    pub fn composite(mut self, enabled: bool) -> Self {
        self.composite = Some(enabled);
        self
    }

    /// Set the comparison tile height.
    #[must_use]
    pub fn tile_height(mut self, height: u32) -> Self {
        self.tile_height = Some(height);
        self
    }

    /// Use a fixed run identifier.
    #[must_use]
    pub fn run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// Build the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `runs_dir` is not set.
    #[must_use]
    pub fn build(self) -> EvalConfig {
        EvalConfig {
            runs_dir: self.runs_dir.expect("runs_dir is required"),
            api_delay: self.api_delay.unwrap_or(crate::config::DEFAULT_API_DELAY),
            composite: self.composite.unwrap_or(true),
            tile_height: self.tile_height.unwrap_or(DEFAULT_TILE_HEIGHT),
            run_id: self.run_id,
        }
    }
}

/// Expand sources × models into work items, sources outermost.
#[must_use]
pub fn plan<S: AsRef<str>>(sources: &[ImageRef], models: &[S]) -> Vec<WorkItem> {
    sources
        .iter()
        .flat_map(|image| {
            models
                .iter()
                .map(move |model| WorkItem::new(image.clone(), model.as_ref()))
        })
        .collect()
}

/// Multi-model evaluation session.
pub struct EvalSession<'a> {
    config: EvalConfig,
    processor: Processor<'a>,
}

impl<'a> EvalSession<'a> {
    /// Create a session.
    pub fn new(
        config: EvalConfig,
        registry: &'a ModelRegistry,
        transformer: &'a dyn Transformer,
        prompt: &Prompt,
    ) -> Self {
        Self {
            config,
            processor: Processor::new(registry, transformer, prompt),
        }
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Run every source through every model.
    ///
    /// Repeated sources and models are dropped, keeping the first occurrence.
    /// Two different sources with the same file name would overwrite each
    /// other's outputs and are rejected.
    ///
    /// Per-item failures are recorded in the manifest; the run only returns an
    /// error when it cannot continue at all (no run directory, rejected
    /// credential, unwritable manifest). A manifest where everything failed is
    /// still `Ok`, and so is one where a comparison image could not be written.
    pub fn run_evaluation<S: AsRef<str>>(
        &self,
        sources: &[ImageRef],
        models: &[S],
    ) -> Result<RunManifest> {
        if sources.is_empty() {
            return Err(Error::InvalidInput("no source images".to_string()));
        }
        if models.is_empty() {
            return Err(Error::InvalidInput("no models selected".to_string()));
        }
        let sources = unique_sources(sources)?;
        let models = unique_models(models);

        let requested_id = self
            .config
            .run_id
            .clone()
            .unwrap_or_else(|| Local::now().format("%Y%m%d-%H%M%S").to_string());
        let (id, run_dir) = create_run_dir(&self.config.runs_dir, &requested_id)?;
        let layout = RunLayout::new(&run_dir);

        let mut manifest = RunManifest::new(
            id,
            run_dir,
            self.processor.prompt().to_string(),
            models.clone(),
            sources.clone(),
        );
        manifest.save()?;

        let items = plan(&sources, &models);
        info!(
            run = %manifest.id,
            items = items.len(),
            dir = %manifest.run_dir.display(),
            "starting evaluation"
        );

        for (index, item) in items.iter().enumerate() {
            if index > 0 && !self.config.api_delay.is_zero() {
                std::thread::sleep(self.config.api_delay);
            }

            info!(item = %item, "[{}/{}] running", index + 1, items.len());
            let result = self.processor.process(item, &layout);
            let fatal = match &result.failure {
                Some(failure) if failure.kind.is_fatal() => Some(failure.message.clone()),
                _ => None,
            };

            manifest.push(result);

            if let Some(message) = fatal {
                error!(run = %manifest.id, %message, "aborting run");
                manifest.aborted = Some(message.clone());
                manifest.save()?;
                manifest.write_log()?;
                return Err(Error::Authentication(message));
            }
            manifest.save()?;
        }

        if self.config.composite {
            let tile_height = self.config.tile_height;
            for source in &sources {
                let result = composite::compose_source(&manifest, source, &layout, tile_height);
                let record = result.unwrap_or_else(|e| {
                    warn!(source = %source, %e, "comparison failed");
                    CompositeRecord::failed(source.clone(), &e)
                });
                manifest.composites.push(record);
            }
        }

        manifest.finished_at = Some(chrono::Utc::now());
        manifest.save()?;
        manifest.write_csv()?;
        manifest.write_log()?;

        let summary = manifest.summary();
        if summary.all_failed() {
            error!(run = %manifest.id, "no model succeeded for any image");
        } else {
            info!(
                run = %manifest.id,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "evaluation finished"
            );
        }

        Ok(manifest)
    }
}

/// Sources in caller order without repeats.
fn unique_sources(sources: &[ImageRef]) -> Result<Vec<ImageRef>> {
    let mut unique: Vec<ImageRef> = Vec::with_capacity(sources.len());
    for source in sources {
        let key = source.output_key();
        match unique.iter().find(|seen| seen.output_key() == key) {
            Some(seen) if seen == source => {
                warn!(source = %source, "source listed twice, ignoring repeat");
            }
            Some(seen) => {
                return Err(Error::InvalidInput(format!(
                    "sources {} and {} share a file name and would overwrite each other",
                    seen.path().display(),
                    source.path().display()
                )));
            }
            None => unique.push(source.clone()),
        }
    }
    Ok(unique)
}

/// Model identifiers in caller order without repeats.
fn unique_models<S: AsRef<str>>(models: &[S]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(models.len());
    for model in models {
        let model = model.as_ref();
        if unique.iter().any(|seen| seen == model) {
            warn!(model, "model listed twice, ignoring repeat");
        } else {
            unique.push(model.to_string());
        }
    }
    unique
}

/// Create a fresh run directory, suffixing `-2`, `-3`, ... on collision.
fn create_run_dir(runs_dir: &Path, id: &str) -> Result<(String, PathBuf)> {
    std::fs::create_dir_all(runs_dir).map_err(|e| {
        let dir = runs_dir.display();
        Error::Report(format!("cannot create runs directory {dir}: {e}"))
    })?;

    for n in 1..1000 {
        let candidate = match n {
            1 => id.to_string(),
            _ => format!("{id}-{n}"),
        };
        let path = runs_dir.join(&candidate);
        match std::fs::create_dir(&path) {
            Ok(()) => return Ok((candidate, path)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(Error::Report(format!(
                    "cannot create run directory {}: {e}",
                    path.display()
                )));
            }
        }
    }

    Err(Error::Report(format!("too many runs named {id} in {}", runs_dir.display())))
}
