//! `eval` command: multi-model comparison run.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result, bail};
use tracing::warn;
use whiteboard_eval::queue::list_images;
use whiteboard_eval::{EvalConfig, EvalSession};

use super::{Context, print_summary};

pub fn run(
    ctx: &Context,
    models: Vec<String>,
    source: Option<PathBuf>,
    no_composite: bool,
) -> Result<ExitCode> {
    let client = ctx.client()?;

    let models: Vec<String> = if models.is_empty() {
        ctx.registry.ids().map(str::to_string).collect()
    } else {
        models
    };
    for id in &models {
        if ctx.registry.get_model(id).is_err() {
            warn!(model = %id, "unknown model, its items will fail");
        }
    }

    let source_dir = source.unwrap_or_else(|| ctx.workspace.eval_source_dir.clone());
    let sources = list_images(&source_dir)
        .with_context(|| format!("Failed to list source images in {}", source_dir.display()))?;
    if sources.is_empty() {
        bail!("No source images in {}", source_dir.display());
    }

    println!(
        "Evaluating {} image(s) with {} model(s): {}",
        sources.len(),
        models.len(),
        models.join(", ")
    );

    let config = EvalConfig::builder()
        .runs_dir(&ctx.workspace.runs_dir)
        .api_delay(ctx.api_delay)
        .composite(!no_composite)
        .build();
    let session = EvalSession::new(config, &ctx.registry, &client, &ctx.prompt);

    let manifest = session
        .run_evaluation(&sources, &models)
        .context("Evaluation run stopped")?;

    let run_dir = manifest.run_dir.display();
    println!("Run {} written to {run_dir}", manifest.id);
    for composite in &manifest.composites {
        let source = &composite.source;
        match (&composite.path, &composite.error) {
            (Some(path), _) => println!("  comparison: {}", path.display()),
            (None, Some(error)) => println!("  comparison for {source} failed: {error}"),
            (None, None) => println!("  no comparison for {source}: every model failed"),
        }
    }

    let summary = manifest.summary();
    print_summary(&summary);
    Ok(ctx.exit_code(&summary))
}
