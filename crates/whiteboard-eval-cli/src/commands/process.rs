//! `process` command: default mode.

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use whiteboard_eval::{BatchOptions, BatchRunner, EnhancedLayout, Queue};

use super::{Context, print_summary};

pub fn run(
    ctx: &Context,
    model: Option<String>,
    folder: Option<String>,
    force: bool,
    archive: bool,
) -> Result<ExitCode> {
    let client = ctx.client()?;

    let model_id = model.unwrap_or_else(|| ctx.registry.default_model().id.clone());
    ctx.registry
        .get_model(&model_id)
        .context("Run `whiteboard-eval models` to see the choices")?;

    let queue_dir = &ctx.workspace.queue_dir;
    let queue = Queue::open(queue_dir)
        .with_context(|| format!("Failed to open queue {}", queue_dir.display()))?;

    let runner = BatchRunner::new(
        &ctx.registry,
        &client,
        &ctx.prompt,
        EnhancedLayout::new(&ctx.workspace.enhanced_dir),
    );
    let options = BatchOptions {
        force,
        api_delay: ctx.api_delay,
        folder,
        archive_to: archive.then(|| ctx.workspace.processed_dir.clone()),
    };

    let report = runner
        .run(&queue, &model_id, &options)
        .with_context(|| format!("Processing with {model_id} stopped"))?;

    println!("Model: {}", report.model);
    for result in &report.results {
        let detail = match (&result.output, &result.failure) {
            (_, Some(failure)) => failure.message.clone(),
            (Some(path), None) => path.display().to_string(),
            (None, None) => String::new(),
        };
        let status = result.status.as_str();
        println!("  {status:<9} {}  {detail}", result.item.image);
    }
    for path in &report.archived {
        println!("Archived {}", path.display());
    }

    let summary = report.summary();
    print_summary(&summary);
    Ok(ctx.exit_code(&summary))
}
