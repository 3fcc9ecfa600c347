//! Search command - list tags of one category

use anyhow::{Context as _, Result};
use clap::Args;
use tagtrace_backend::SearchFilters;

use super::{print_json, Context};

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Category to list (e.g. REQ, TEST)
    category: String,

    /// Identifier substring
    #[arg(long)]
    identifier: Option<String>,

    /// File path substring
    #[arg(long)]
    file: Option<String>,

    /// Description substring
    #[arg(long)]
    description: Option<String>,

    /// Maximum number of results
    #[arg(long, short = 'n')]
    limit: Option<usize>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the search command
pub fn execute(args: SearchArgs, ctx: &Context) -> Result<()> {
    let adapter = ctx.adapter()?;
    let category = args.category.to_uppercase();
    let filters = SearchFilters {
        identifier: args.identifier,
        file: args.file,
        description: args.description,
        limit: args.limit,
    };

    let tags = adapter
        .search_by_category(&category, &filters)
        .with_context(|| format!("Failed to search category {category}"))?;

    if args.json {
        return print_json(&tags);
    }
    for tag in &tags {
        println!(
            "{:<24} {}:{}{}",
            tag.key,
            tag.file_path,
            tag.line_number,
            tag.description
                .as_deref()
                .map(|d| format!("  {d}"))
                .unwrap_or_default()
        );
    }
    if tags.is_empty() && !ctx.quiet {
        eprintln!("No {category} tags found");
    }
    Ok(())
}
