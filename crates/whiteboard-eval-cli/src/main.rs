//! whiteboard-eval CLI - whiteboard cleanup and model comparison tool

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;
mod telemetry;

/// Clean up whiteboard photos with hosted image models and compare the results.
#[derive(Parser)]
#[command(name = "whiteboard-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project root holding images/ and eval/
    #[arg(long, global = true, default_value = ".", env = "WHITEBOARD_EVAL_ROOT")]
    root: PathBuf,

    /// JSON file with model definitions (replaces the built-in models)
    #[arg(long, global = true, env = "WHITEBOARD_EVAL_MODELS")]
    models_file: Option<PathBuf>,

    /// File whose contents replace the built-in prompt
    #[arg(long, global = true)]
    prompt_file: Option<PathBuf>,

    /// Extra instructions appended to the prompt
    #[arg(long, global = true)]
    extra_instructions: Option<String>,

    /// Seconds to wait between remote calls
    #[arg(long, global = true, default_value_t = 2.0)]
    api_delay: f64,

    /// Maximum seconds to wait for one prediction
    #[arg(long, global = true, default_value_t = 600)]
    max_wait: u64,

    /// Exit non-zero when any image fails
    #[arg(long, global = true)]
    fail_on_error: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available models
    Models {
        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },

    /// List queue folders and their images
    Folders,

    /// Process pending queue images with one model
    Process {
        /// Model identifier (default: the registry default)
        #[arg(short, long)]
        model: Option<String>,

        /// Only process this batch folder
        #[arg(short, long)]
        folder: Option<String>,

        /// Reprocess images that already have output
        #[arg(long)]
        force: bool,

        /// Move fully processed folders to images/originals/processed
        #[arg(long)]
        archive: bool,
    },

    /// Run source images through several models and build comparisons
    Eval {
        /// Comma-separated model identifiers (default: all)
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Directory of source images (default: eval/source)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Skip side-by-side comparison images
        #[arg(long)]
        no_composite: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    telemetry::init_tracing(cli.json_logs, level);

    let ctx = commands::Context::from_cli(&cli)?;

    match cli.command {
        Commands::Models { json } => commands::models::run(&ctx, json),
        Commands::Folders => commands::folders::run(&ctx),
        Commands::Process { model, folder, force, archive } => {
            commands::process::run(&ctx, model, folder, force, archive)
        }
        Commands::Eval { models, source, no_composite } => {
            commands::eval::run(&ctx, models, source, no_composite)
        }
    }
}
