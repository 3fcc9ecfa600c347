//! Scan command - full rebuild of the tag index

use anyhow::{Context as _, Result};
use clap::Args;

use super::{print_json, Context};
use crate::progress::{finish_spinner, spinner};

/// Arguments for the scan command
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the scan command
pub fn execute(args: ScanArgs, ctx: &Context) -> Result<()> {
    let adapter = ctx.adapter()?;
    let pb = spinner(
        &format!("Scanning {}...", ctx.project.display()),
        ctx.quiet || args.json,
    );

    let summary = adapter.rebuild().context("Failed to rebuild tag index")?;

    finish_spinner(
        pb,
        &format!(
            "Indexed {} tags ({} keys, {} references) from {} of {} files [{}]",
            summary.tags,
            summary.keys,
            summary.references,
            summary.tagged_files,
            summary.files_scanned,
            adapter.backend_kind()
        ),
    );

    if args.json {
        print_json(&summary)?;
    }
    Ok(())
}
