mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "adapt",
    about = "Adaptive outcome tuning for agent pipelines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .adapt/ or .git/)
    #[arg(long, global = true, env = "ADAPT_ROOT")]
    root: Option<PathBuf>,

    /// Failure memory root (default: memory.dir from config, else ~/.adapt/memory)
    #[arg(long, global = true, env = "ADAPT_MEMORY_DIR")]
    memory_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the outcome of a completed pipeline from its state file
    AnalyzeOutcome {
        /// Path to the pipeline state file
        state_file: PathBuf,
    },

    /// Run every tuning step, then print the report
    Tune,

    /// Show recent outcomes and the current models
    Report,

    /// Prune, strengthen, and promote failure patterns
    EvolveMemory,

    /// Record a failure pattern in a repository's memory store
    CaptureFailure {
        /// Repository name (store directory under the memory root)
        repo: String,
        /// Pipeline stage the failure happened in
        #[arg(long)]
        stage: String,
        /// File containing the error output
        error_file: PathBuf,
    },

    /// Query the models for a prospective pipeline
    Recommend {
        /// Comma-separated labels of the issue
        #[arg(long, default_value = "")]
        labels: String,
        /// Complexity score of the issue
        #[arg(long)]
        complexity: Option<u32>,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version print to stdout and succeed; usage errors exit 1.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let default_level = match &cli.command {
        Commands::Tune => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let ctx = cmd::Context {
        root,
        memory_dir: cli.memory_dir,
        json: cli.json,
    };

    let result = match cli.command {
        Commands::AnalyzeOutcome { state_file } => cmd::analyze::run(&ctx, &state_file),
        Commands::Tune => cmd::tune::run(&ctx),
        Commands::Report => cmd::report::run(&ctx),
        Commands::EvolveMemory => cmd::evolve::run(&ctx),
        Commands::CaptureFailure {
            repo,
            stage,
            error_file,
        } => cmd::capture::run(&ctx, &repo, &stage, &error_file),
        Commands::Recommend { labels, complexity } => {
            cmd::recommend::run(&ctx, &labels, complexity)
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
