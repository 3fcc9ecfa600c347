//! Validate command - strict checks on a flat index

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::Value;
use tagtrace_core::FlatIndexValidator;

use super::{print_info, print_json, Context};

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Flat index to check (defaults to the configured flat index)
    input: Option<PathBuf>,

    /// Minimum identifier length (defaults to the configured value)
    #[arg(long)]
    min_identifier_length: Option<usize>,

    /// Print errors as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the validate command
pub fn execute(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let input = args
        .input
        .map(|p| ctx.project_path(&p))
        .unwrap_or_else(|| ctx.config.flat_index_path(&ctx.project));

    let content = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", input.display()))?;

    let validator = FlatIndexValidator::new(
        args.min_identifier_length
            .unwrap_or(ctx.config.migration.min_identifier_length),
    );
    let errors = validator.validate(&value);

    if args.json {
        print_json(&errors)?;
    } else {
        for error in &errors {
            println!("{error}");
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("{} validation error(s) in {}", errors.len(), input.display());
    }
    print_info(&format!("✓ {} is valid", input.display()), ctx.quiet || args.json);
    Ok(())
}
