//! Subcommand implementations and the state they share.

pub mod eval;
pub mod folders;
pub mod models;
pub mod process;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tracing::{debug, warn};
use whiteboard_eval::{ClientConfig, ModelRegistry, Prompt, ReplicateClient, RunSummary, Workspace};

use crate::Cli;

/// Settings resolved from global flags.
pub struct Context {
    pub workspace: Workspace,
    pub registry: ModelRegistry,
    pub prompt: Prompt,
    pub api_delay: Duration,
    pub max_wait: Duration,
    pub fail_on_error: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let workspace = Workspace::new(&cli.root);
        load_dotenv(&workspace);

        let registry = match &cli.models_file {
            Some(path) => ModelRegistry::load(path)
                .with_context(|| format!("Failed to load models from {}", path.display()))?,
            None => ModelRegistry::builtin(),
        };

        let mut prompt = match &cli.prompt_file {
            Some(path) => Prompt::from_file(path)
                .with_context(|| format!("Failed to read prompt from {}", path.display()))?,
            None => Prompt::default(),
        };
        if let Some(extra) = &cli.extra_instructions {
            prompt = prompt.with_extra(extra.as_str());
        }

        let api_delay = Duration::try_from_secs_f64(cli.api_delay)
            .with_context(|| format!("Invalid --api-delay: {}", cli.api_delay))?;

        Ok(Self {
            workspace,
            registry,
            prompt,
            api_delay,
            max_wait: Duration::from_secs(cli.max_wait),
            fail_on_error: cli.fail_on_error,
        })
    }

    /// Build the remote client; fails fast when the credential is missing.
    pub fn client(&self) -> Result<ReplicateClient> {
        let config = ClientConfig::default().with_max_wait(self.max_wait);
        ReplicateClient::from_env(config).context("Cannot talk to Replicate")
    }

    pub fn exit_code(&self, summary: &RunSummary) -> ExitCode {
        if self.fail_on_error && summary.failed > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

fn load_dotenv(workspace: &Workspace) {
    let path = workspace.dotenv_path();
    match dotenvy::from_path(&path) {
        Ok(()) => debug!(path = %path.display(), "loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(path = %path.display(), %e, "ignoring unreadable environment file"),
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    print!("{summary}");
    if summary.all_failed() {
        println!("No image was processed successfully.");
    }
}
