//! CLI command implementations

pub mod analyze;
pub mod chain;
pub mod init;
pub mod migrate;
pub mod scan;
pub mod search;
pub mod stats;
pub mod validate;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;
use tagtrace_backend::{SqliteBackend, TagAdapter};
use tagtrace_config::{ConfigLoader, TraceConfig};

use crate::GlobalOptions;

/// Everything a command needs after global options are resolved.
pub struct Context {
    pub project: PathBuf,
    pub config: TraceConfig,
    pub quiet: bool,
    pub verbose: bool,
}

impl Context {
    /// Open the adapter without starting the watcher.
    pub fn adapter(&self) -> Result<TagAdapter> {
        let mut config = self.config.clone();
        config.watch.enabled = false;
        TagAdapter::open(&self.project, &config).context("Failed to open tag backend")
    }

    /// Resolve a user-supplied path against the project root.
    pub fn project_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project.join(path)
        }
    }
}

/// Resolve the project root from options or current directory.
pub fn resolve_project(global: &GlobalOptions) -> Result<PathBuf> {
    match &global.project {
        Some(path) => path
            .canonicalize()
            .with_context(|| format!("Project not found: {}", path.display())),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

/// Load configuration with optional config file override.
pub fn load_config(global: &GlobalOptions, project: &Path) -> Result<TraceConfig> {
    let overrides = global.to_config_overrides();

    if let Some(ref config_path) = global.config {
        return ConfigLoader::load_file(config_path, Some(&overrides))
            .context("Failed to load config file");
    }

    ConfigLoader::new()
        .load(project, Some(&overrides))
        .context("Failed to load configuration")
}

/// The relational backend, or an error explaining why it is required.
pub fn require_relational<'a>(adapter: &'a TagAdapter, command: &str) -> Result<&'a SqliteBackend> {
    adapter.relational().ok_or_else(|| {
        anyhow::anyhow!("'{command}' needs the relational store, which could not be opened")
    })
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
