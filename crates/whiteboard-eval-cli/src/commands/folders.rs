//! `folders` command.

use std::process::ExitCode;

use anyhow::{Context as _, Result};
use whiteboard_eval::{EnhancedLayout, OutputNaming, Queue};

use super::Context;

pub fn run(ctx: &Context) -> Result<ExitCode> {
    let queue_dir = &ctx.workspace.queue_dir;
    let queue = Queue::open(queue_dir)
        .with_context(|| format!("Failed to open queue {}", queue_dir.display()))?;
    let scan = queue
        .scan()
        .with_context(|| format!("Failed to scan queue {}", queue_dir.display()))?;

    let layout = EnhancedLayout::new(&ctx.workspace.enhanced_dir);
    let model = ctx.registry.default_model();

    if scan.folders.is_empty() {
        println!("No batch folders in {}", queue_dir.display());
    }
    for folder in &scan.folders {
        let done = folder
            .images
            .iter()
            .filter(|image| layout.output_path(image, model).exists())
            .count();
        println!(
            "  {:<30} {:>4} images  ({} done with {})",
            folder.name,
            folder.images.len(),
            done,
            model.id
        );
    }

    for warning in &scan.warnings {
        println!("  warning: {warning}");
    }

    Ok(ExitCode::SUCCESS)
}
