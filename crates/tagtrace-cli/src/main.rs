//! tagtrace CLI - traceability tag indexing
//!
//! Scans a project for `@CATEGORY:IDENTIFIER` tags, keeps them in a SQLite
//! store (or the flat JSON index when the store is unavailable) and answers
//! questions about how requirements trace through to tests.
//!
//! # Usage
//!
//! ```bash
//! # Index the current project
//! tagtrace scan
//!
//! # Import an existing flat index into the relational store
//! tagtrace migrate --input .tagtrace/tags.json
//!
//! # Follow a requirement down to its tests
//! tagtrace chain REQ:AUTH-01 --direction forward
//!
//! # Keep the index current while editing
//! tagtrace watch
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tagtrace_config::{ConfigOverrides, LogFormat, TraceConfig};
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// tagtrace - Traceability tag indexing and analysis
#[derive(Parser, Debug)]
#[command(name = "tagtrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Project root (defaults to the current directory)
    #[arg(long, short = 'p', global = true, env = "TAGTRACE_PROJECT")]
    project: Option<PathBuf>,

    /// Path to a configuration file (replaces global and local lookup)
    #[arg(long, short = 'c', global = true, env = "TAGTRACE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory, relative to the project root
    #[arg(long, global = true, env = "TAGTRACE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        let log_level = if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            None
        };

        ConfigOverrides {
            data_dir: self.data_dir.clone(),
            log_level,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init(commands::init::InitArgs),

    /// Scan the project and rebuild the tag index
    Scan(commands::scan::ScanArgs),

    /// Import a flat JSON index into the relational store
    Migrate(commands::migrate::MigrateArgs),

    /// Export the relational store to a flat JSON index
    Export(commands::migrate::ExportArgs),

    /// Restore the newest backup of a file
    Rollback(commands::migrate::RollbackArgs),

    /// Validate a flat JSON index without importing it
    Validate(commands::validate::ValidateArgs),

    /// Check chains, cycles, orphans and naming across all tags
    Analyze(commands::analyze::AnalyzeArgs),

    /// Show tag and reference counts
    Stats(commands::stats::StatsArgs),

    /// List tags of one category
    Search(commands::search::SearchArgs),

    /// Show the traceability chain around a tag
    Chain(commands::chain::ChainArgs),

    /// Watch the project and keep the index in sync
    Watch(commands::watch::WatchArgs),
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &TraceConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Text => builder.with_ansi(true).try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let project = commands::resolve_project(&cli.global)?;
    let config = commands::load_config(&cli.global, &project)?;
    init_logging(&config)?;

    let ctx = commands::Context {
        project,
        config,
        quiet: cli.global.quiet,
        verbose: cli.global.verbose,
    };

    match cli.command {
        Commands::Init(args) => commands::init::execute(args, &ctx),
        Commands::Scan(args) => commands::scan::execute(args, &ctx),
        Commands::Migrate(args) => commands::migrate::execute_migrate(args, &ctx),
        Commands::Export(args) => commands::migrate::execute_export(args, &ctx),
        Commands::Rollback(args) => commands::migrate::execute_rollback(args, &ctx),
        Commands::Validate(args) => commands::validate::execute(args, &ctx),
        Commands::Analyze(args) => commands::analyze::execute(args, &ctx),
        Commands::Stats(args) => commands::stats::execute(args, &ctx),
        Commands::Search(args) => commands::search::execute(args, &ctx),
        Commands::Chain(args) => commands::chain::execute(args, &ctx),
        Commands::Watch(args) => commands::watch::execute(args, &ctx),
    }
}
