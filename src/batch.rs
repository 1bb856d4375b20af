//! Default mode: process the queue with one model into the enhanced tree.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};

use crate::config::DEFAULT_API_DELAY;
use crate::error::{Error, Result};
use crate::eval::report::{ProcessingResult, RunSummary, WorkItem};
use crate::inference::Transformer;
use crate::layout::{EnhancedLayout, OutputNaming};
use crate::processor::Processor;
use crate::prompt::Prompt;
use crate::queue::{Queue, ScanWarning};
use crate::registry::ModelRegistry;

/// Options for one default-mode run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Reprocess images that already have output.
    pub force: bool,
    /// Pause between remote calls.
    pub api_delay: Duration,
    /// Only process this batch folder.
    pub folder: Option<String>,
    /// Move fully processed folders here afterwards.
    pub archive_to: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            force: false,
            api_delay: DEFAULT_API_DELAY,
            folder: None,
            archive_to: None,
        }
    }
}

/// Outcome of a default-mode run.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Model used.
    pub model: String,
    /// One result per queue image, in queue order.
    pub results: Vec<ProcessingResult>,
    /// Scan problems.
    pub warnings: Vec<ScanWarning>,
    /// Folders moved to the processed tree.
    pub archived: Vec<PathBuf>,
}

impl BatchReport {
    /// Outcome counts.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary::from_results(&self.results)
    }
}

/// Runs queue images through one model.
pub struct BatchRunner<'a> {
    registry: &'a ModelRegistry,
    processor: Processor<'a>,
    layout: EnhancedLayout,
}

impl<'a> BatchRunner<'a> {
    /// Create a runner writing under `layout`.
    pub fn new(
        registry: &'a ModelRegistry,
        transformer: &'a dyn Transformer,
        prompt: &Prompt,
        layout: EnhancedLayout,
    ) -> Self {
        Self {
            registry,
            processor: Processor::new(registry, transformer, prompt),
            layout,
        }
    }

    /// Output layout.
    #[must_use]
    pub fn layout(&self) -> &EnhancedLayout {
        &self.layout
    }

    /// Process every queue image that has no output for `model_id` yet.
    ///
    /// An unknown model, an unreadable queue, an unmatched folder filter or a
    /// rejected credential stop the run; anything else is recorded per image.
    pub fn run(
        &self,
        queue: &Queue,
        model_id: &str,
        options: &BatchOptions,
    ) -> Result<BatchReport> {
        let model = self.registry.get_model(model_id)?;

        let mut scan = queue.scan()?;
        if let Some(folder) = &options.folder {
            scan = scan.only_folder(folder);
            if scan.folders.is_empty() {
                return Err(Error::Queue(format!(
                    "no batch folder named {folder} with images in {}",
                    queue.root().display()
                )));
            }
        }

        let mut report = BatchReport {
            model: model.id.clone(),
            warnings: scan.warnings.clone(),
            ..BatchReport::default()
        };

        let mut processed = 0usize;
        for image in scan.images() {
            let item = WorkItem::new(image.clone(), &model.id);
            let existing = self.layout.output_path(image, model);

            if existing.exists() && !options.force {
                info!(item = %item, "output exists, skipping");
                let skipped = ProcessingResult::skipped(item, existing);
                report.results.push(skipped);
                continue;
            }

            if processed > 0 && !options.api_delay.is_zero() {
                std::thread::sleep(options.api_delay);
            }
            processed += 1;

            let result = self.processor.process(&item, &self.layout);
            if result.error_kind().is_some_and(|kind| kind.is_fatal()) {
                let message = result.failure.map(|f| f.message).unwrap_or_default();
                error!(%message, "aborting batch");
                return Err(Error::Authentication(message));
            }
            report.results.push(result);
        }

        if let Some(processed_root) = &options.archive_to {
            for folder in &scan.folders {
                let done = folder
                    .images
                    .iter()
                    .all(|image| self.layout.output_path(image, model).exists());
                if done {
                    let archived = queue.archive_folder(folder, processed_root)?;
                    report.archived.push(archived);
                } else {
                    info!(folder = %folder.name, "not archiving, some images have no output");
                }
            }
        }

        let summary = report.summary();
        info!(
            model = %model.id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::ErrorKind;
    use crate::eval::report::ItemStatus;
    use crate::test_support::{FakeTransformer, png_bytes};

    struct Fixture {
        dir: tempfile::TempDir,
        queue: Queue,
        registry: ModelRegistry,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let queue_dir = dir.path().join("queue");
        let batches = [("Team Sync", &["b.png", "a.png"][..]), ("retro", &["board.jpg"][..])];
        for (folder, files) in batches {
            fs::create_dir_all(queue_dir.join(folder)).unwrap();
            for file in files {
                let bytes = png_bytes(4, 4, [1, 2, 3, 255]);
                fs::write(queue_dir.join(folder).join(file), bytes).unwrap();
            }
        }
        Fixture {
            queue: Queue::open(&queue_dir).unwrap(),
            registry: ModelRegistry::builtin(),
            dir,
        }
    }

    impl Fixture {
        fn enhanced(&self) -> PathBuf {
            self.dir.path().join("enhanced")
        }

        fn options(&self) -> BatchOptions {
            BatchOptions {
                api_delay: Duration::ZERO,
                ..BatchOptions::default()
            }
        }

        fn runner<'a>(&'a self, fake: &'a FakeTransformer) -> BatchRunner<'a> {
            let layout = EnhancedLayout::new(self.enhanced());
            BatchRunner::new(&self.registry, fake, &Prompt::default(), layout)
        }
    }

    #[test]
    fn test_processes_queue_in_order() {
        let fx = fixture();
        let fake = FakeTransformer::new();
        let runner = fx.runner(&fake);

        let report = runner.run(&fx.queue, "nano-banana", &fx.options()).unwrap();

        let images = report.results.iter().map(|r| &r.item.image);
        let names: Vec<&str> = images.map(|image| image.file_name()).collect();
        assert_eq!(names, ["a.png", "b.png", "board.jpg"]);
        assert_eq!(report.summary().succeeded, 3);
        let team_sync = fx.enhanced().join("Team Sync");
        assert!(team_sync.join("team-sync-a-png-nano-banana.png").exists());
        let retro = fx.enhanced().join("retro");
        assert!(retro.join("retro-board-jpg-nano-banana.png").exists());
    }

    #[test]
    fn test_second_run_skips_everything() {
        let fx = fixture();
        let fake = FakeTransformer::new();
        let runner = fx.runner(&fake);

        runner.run(&fx.queue, "nano-banana", &fx.options()).unwrap();
        let output = fx.enhanced().join("retro/retro-board-jpg-nano-banana.png");
        let before = fs::read(&output).unwrap();

        let second = runner.run(&fx.queue, "nano-banana", &fx.options()).unwrap();

        assert_eq!(fake.calls().len(), 3);
        assert_eq!(second.summary().skipped, 3);
        assert_eq!(fs::read(&output).unwrap(), before);
    }

    #[test]
    fn test_force_reprocesses() {
        let fx = fixture();
        let fake = FakeTransformer::new();
        let runner = fx.runner(&fake);

        runner.run(&fx.queue, "nano-banana", &fx.options()).unwrap();
        let options = BatchOptions {
            force: true,
            ..fx.options()
        };
        let report = runner.run(&fx.queue, "nano-banana", &options).unwrap();

        assert_eq!(fake.calls().len(), 6);
        assert_eq!(report.summary().succeeded, 3);
    }

    #[test]
    fn test_folder_filter() {
        let fx = fixture();
        let fake = FakeTransformer::new();
        let runner = fx.runner(&fake);

        let options = BatchOptions {
            folder: Some("retro".into()),
            ..fx.options()
        };
        let report = runner.run(&fx.queue, "nano-banana", &options).unwrap();
        assert_eq!(report.results.len(), 1);

        let options = BatchOptions {
            folder: Some("missing".into()),
            ..fx.options()
        };
        let result = runner.run(&fx.queue, "nano-banana", &options);
        assert!(matches!(result, Err(Error::Queue(_))));
    }

    #[test]
    fn test_unknown_model_is_fatal() {
        let fx = fixture();
        let fake = FakeTransformer::new();
        let runner = fx.runner(&fake);

        let err = runner.run(&fx.queue, "dall-e", &fx.options()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownModel);
        assert!(!fx.enhanced().exists());
    }

    #[test]
    fn test_archives_only_complete_folders() {
        let fx = fixture();
        // Unreadable files are not part of the folder and do not block archiving.
        fs::write(fx.queue.root().join("retro/late.png"), b"not an image").unwrap();
        let fake = FakeTransformer::new();
        let runner = fx.runner(&fake);

        let processed = fx.dir.path().join("processed");
        let options = BatchOptions {
            archive_to: Some(processed.clone()),
            ..fx.options()
        };
        let report = runner.run(&fx.queue, "nano-banana", &options).unwrap();

        assert_eq!(report.archived.len(), 2);
        assert_eq!(report.warnings.len(), 1);
        assert!(processed.join("Team Sync/a.png").exists());
        assert!(processed.join("retro/board.jpg").exists());
        assert!(!fx.queue.root().join("retro").exists());
    }

    #[test]
    fn test_partial_folder_not_archived() {
        let fx = fixture();
        let board = fx.queue.root().join("retro/board.jpg");
        fs::write(&board, png_bytes(5, 5, [7, 7, 7, 255])).unwrap();
        let retro = fs::read(&board).unwrap();
        let fake = FakeTransformer::new().fail_for(retro, "nano-banana", ErrorKind::Inference);
        let runner = fx.runner(&fake);

        let processed = fx.dir.path().join("processed");
        let options = BatchOptions {
            archive_to: Some(processed.clone()),
            ..fx.options()
        };
        let report = runner.run(&fx.queue, "nano-banana", &options).unwrap();

        assert_eq!(report.summary().failed, 1);
        assert_eq!(report.archived, vec![processed.join("Team Sync")]);
        assert!(fx.queue.root().join("retro/board.jpg").exists());
    }

    #[test]
    fn test_authentication_aborts_batch() {
        let fx = fixture();
        let fake = FakeTransformer::new().fail_model("nano-banana", ErrorKind::Authentication);
        let runner = fx.runner(&fake);

        let options = fx.options();
        let err = runner.run(&fx.queue, "nano-banana", &options).unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(fake.calls().len(), 1);
        assert!(!fx.enhanced().exists());
    }

    #[test]
    fn test_similar_names_in_one_folder_all_processed() {
        let dir = tempfile::tempdir().unwrap();
        let standup = dir.path().join("queue/standup");
        fs::create_dir_all(&standup).unwrap();
        let names = ["Board 1.png", "board.jpg", "board.png", "board_1.png"];
        for (i, name) in names.iter().enumerate() {
            let shade = 40 * i as u8;
            let bytes = png_bytes(3, 3, [shade, shade, shade, 255]);
            fs::write(standup.join(name), bytes).unwrap();
        }

        let queue = Queue::open(dir.path().join("queue")).unwrap();
        let registry = ModelRegistry::builtin();
        let fake = FakeTransformer::new();
        let enhanced = dir.path().join("enhanced");
        let layout = EnhancedLayout::new(&enhanced);
        let runner = BatchRunner::new(&registry, &fake, &Prompt::default(), layout);
        let options = BatchOptions {
            api_delay: Duration::ZERO,
            ..BatchOptions::default()
        };

        let report = runner.run(&queue, "nano-banana", &options).unwrap();

        assert_eq!(report.summary().succeeded, 4);
        assert_eq!(fake.calls().len(), 4);
        let out = enhanced.join("standup");
        assert_eq!(fs::read_dir(&out).unwrap().count(), 4);
        assert!(out.join("standup-board-jpg-nano-banana.png").exists());
        assert!(out.join("standup-board-png-nano-banana.png").exists());

        let again = runner.run(&queue, "nano-banana", &options).unwrap();
        assert_eq!(again.summary().skipped, 4);
        assert_eq!(fake.calls().len(), 4);
    }
}
