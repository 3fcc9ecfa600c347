//! Migration commands - flat index import, export and rollback

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tagtrace_core::migration::MigrationResult;
use tagtrace_core::{BackupManager, MigrationMode, MigrationReporter};

use super::{print_info, print_json, require_relational, Context};
use crate::progress::{finish_spinner, finish_spinner_error, finish_spinner_warn, migration_callback, spinner};

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Flat index to import (defaults to the configured flat index)
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,

    /// `full` clears the store first; `incremental` only adds new keys
    #[arg(long, short = 'm', default_value = "full")]
    mode: MigrationMode,

    /// Validate the document and abort before writing on any error
    #[arg(long)]
    strict: bool,

    /// Skip the pre-migration backup
    #[arg(long)]
    no_backup: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file (defaults to the configured flat index)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the rollback command
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// File to restore (defaults to the configured database)
    path: Option<PathBuf>,

    /// List available backups instead of restoring
    #[arg(long)]
    list: bool,
}

fn report(result: &MigrationResult, pb: Option<indicatif::ProgressBar>, json: bool) -> Result<()> {
    let headline = format!(
        "{} tags, {} references migrated",
        result.tags_migrated, result.references_migrated
    );
    if !result.success {
        finish_spinner_error(pb, "Migration failed");
    } else if result.is_clean() {
        finish_spinner(pb, &headline);
    } else {
        finish_spinner_warn(pb, &format!("{headline} with {} error(s)", result.errors.len()));
    }

    if json {
        print_json(result)?;
    } else {
        eprintln!("{}", MigrationReporter::render_summary(result));
    }

    if !result.success {
        anyhow::bail!("migration failed: {}", result.errors.join("; "));
    }
    Ok(())
}

/// Execute the migrate command
pub fn execute_migrate(args: MigrateArgs, ctx: &Context) -> Result<()> {
    let input = args
        .input
        .map(|p| ctx.project_path(&p))
        .unwrap_or_else(|| ctx.config.flat_index_path(&ctx.project));
    if !input.is_file() {
        anyhow::bail!("Flat index not found: {}", input.display());
    }

    let adapter = ctx.adapter()?;
    let backend = require_relational(&adapter, "migrate")?;

    let mut engine = backend.engine();
    if args.strict || args.no_backup {
        let mut options = engine.options().clone();
        options.strict |= args.strict;
        options.create_backup &= !args.no_backup;
        engine = engine.with_options(options);
    }

    let pb = spinner(&format!("Migrating {}...", input.display()), ctx.quiet || args.json);
    if let Some(callback) = migration_callback(&pb) {
        engine = engine.with_progress(callback);
    }

    let result = engine.migrate_flat_to_relational(&input, args.mode);
    report(&result, pb, args.json)
}

/// Execute the export command
pub fn execute_export(args: ExportArgs, ctx: &Context) -> Result<()> {
    let output = args
        .output
        .map(|p| ctx.project_path(&p))
        .unwrap_or_else(|| ctx.config.flat_index_path(&ctx.project));

    let adapter = ctx.adapter()?;
    let backend = require_relational(&adapter, "export")?;

    let pb = spinner(&format!("Exporting to {}...", output.display()), ctx.quiet || args.json);
    let mut engine = backend.engine();
    if let Some(callback) = migration_callback(&pb) {
        engine = engine.with_progress(callback);
    }

    let result = engine.migrate_relational_to_flat(&output);
    report(&result, pb, args.json)
}

/// Execute the rollback command
pub fn execute_rollback(args: RollbackArgs, ctx: &Context) -> Result<()> {
    let backups = BackupManager::new(ctx.config.backup_dir(&ctx.project));
    let target = args
        .path
        .map(|p| ctx.project_path(&p))
        .unwrap_or_else(|| ctx.config.database_path(&ctx.project));

    if args.list {
        let list = backups
            .backups_for(&target)
            .context("Failed to list backups")?;
        if list.is_empty() {
            print_info(&format!("No backups for {}", target.display()), ctx.quiet);
        }
        for info in list {
            println!(
                "{}  {}  {} bytes{}",
                info.backup_id,
                info.created_at.format("%Y-%m-%d %H:%M:%S"),
                info.size_bytes,
                info.description
                    .map(|d| format!("  ({d})"))
                    .unwrap_or_default()
            );
        }
        return Ok(());
    }

    let info = backups
        .rollback(&target)
        .with_context(|| format!("Failed to roll back {}", target.display()))?;
    print_info(
        &format!("✓ Restored {} from backup {}", target.display(), info.backup_id),
        ctx.quiet,
    );
    Ok(())
}
