//! Watch command - keep the index in sync with file changes

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::Args;

use super::{print_info, Context};
use crate::progress::{finish_spinner, spinner};

/// Arguments for the watch command
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Skip the initial full scan
    #[arg(long)]
    no_rebuild: bool,

    /// Stop after this many seconds (runs until interrupted by default)
    #[arg(long)]
    duration: Option<u64>,
}

/// Execute the watch command
pub fn execute(args: WatchArgs, ctx: &Context) -> Result<()> {
    let adapter = ctx.adapter()?;

    if !args.no_rebuild {
        let pb = spinner("Scanning project...", ctx.quiet);
        let summary = adapter.rebuild().context("Initial scan failed")?;
        finish_spinner(
            pb,
            &format!("Indexed {} keys from {} files", summary.keys, summary.tagged_files),
        );
    }

    adapter
        .start_watching()
        .context("Failed to start file watcher")?;
    print_info(
        &format!(
            "Watching {} [{}] (Ctrl-C to stop)",
            ctx.project.display(),
            adapter.backend_kind()
        ),
        ctx.quiet,
    );

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        thread::sleep(Duration::from_millis(ctx.config.watch.poll_interval_ms.max(50)));
    }

    adapter.stop_watching();
    Ok(())
}
