//! Init command - write a default configuration file

use anyhow::{Context as _, Result};
use clap::Args;
use tagtrace_config::ConfigLoader;

use super::{print_info, Context};

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Write the global config (~/.tagtrace/config.toml) instead
    #[arg(long)]
    global: bool,
}

/// Execute the init command
pub fn execute(args: InitArgs, ctx: &Context) -> Result<()> {
    let loader = ConfigLoader::new();
    let path = if args.global {
        loader.init_global().context("Failed to write global config")?
    } else {
        loader
            .init_local(&ctx.project)
            .context("Failed to write project config")?
    };

    print_info(&format!("✓ Config at {}", path.display()), ctx.quiet);
    Ok(())
}
