//! Single-image processor: one work item in, one result out.
//!
//! Failures are captured in the returned [`ProcessingResult`] and never
//! propagate, so sibling items keep running.

use std::time::Instant;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::eval::report::{ProcessingResult, WorkItem, write_atomic};
use crate::inference::Transformer;
use crate::layout::OutputNaming;
use crate::prompt::Prompt;
use crate::queue::content_checksum;
use crate::registry::ModelRegistry;

/// Runs one work item through the remote model and persists the output.
pub struct Processor<'a> {
    registry: &'a ModelRegistry,
    transformer: &'a dyn Transformer,
    prompt: String,
}

impl<'a> Processor<'a> {
    /// Create a processor.
    pub fn new(
        registry: &'a ModelRegistry,
        transformer: &'a dyn Transformer,
        prompt: &Prompt,
    ) -> Self {
        Self {
            registry,
            transformer,
            prompt: prompt.text(),
        }
    }

    /// Prompt text sent with each request.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Process one item, writing its output where `naming` says.
    pub fn process(&self, item: &WorkItem, naming: &dyn OutputNaming) -> ProcessingResult {
        let started = Instant::now();
        let mut checksum = None;

        let mut result = match self.run(item, naming, &mut checksum) {
            Ok((path, bytes)) => {
                info!(item = %item, output = %path.display(), bytes, "saved output");
                ProcessingResult::succeeded(item.clone(), path, bytes)
            }
            Err(e) => {
                warn!(item = %item, kind = %e.kind(), error = %e, "processing failed");
                ProcessingResult::failed(item.clone(), &e)
            }
        };

        result.source_checksum = checksum;
        result.elapsed = started.elapsed();
        result
    }

    fn run(
        &self,
        item: &WorkItem,
        naming: &dyn OutputNaming,
        checksum: &mut Option<String>,
    ) -> Result<(std::path::PathBuf, u64)> {
        let model = self.registry.get_model(&item.model)?;

        let image = std::fs::read(item.image.path()).map_err(|e| Error::ImageLoad {
            path: item.image.path().to_path_buf(),
            reason: e.to_string(),
        })?;
        *checksum = Some(content_checksum(&image));

        let output = self.transformer.transform(&image, model, &self.prompt)?;
        if image::guess_format(&output).is_err() {
            return Err(Error::Inference {
                model: model.id.clone(),
                message: "output is not a recognizable image".to_string(),
            });
        }

        let path = naming.output_path(&item.image, model);
        write_atomic(&path, &output)?;
        Ok((path, output.len() as u64))
    }
}
