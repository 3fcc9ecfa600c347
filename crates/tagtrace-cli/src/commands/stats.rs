//! Stats command - tag and reference counts

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use tagtrace_core::search::{IncompleteChain, TagStatistics};

use super::{print_json, require_relational, Context};

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Also list identifiers whose Primary chain is incomplete (relational only)
    #[arg(long)]
    incomplete: bool,

    /// Print statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatsOutput {
    backend: String,
    #[serde(flatten)]
    statistics: TagStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    incomplete_chains: Option<Vec<IncompleteChain>>,
}

/// Execute the stats command
pub fn execute(args: StatsArgs, ctx: &Context) -> Result<()> {
    let adapter = ctx.adapter()?;
    let statistics = adapter.statistics().context("Failed to read statistics")?;
    let incomplete_chains = if args.incomplete {
        Some(require_relational(&adapter, "stats --incomplete")?.incomplete_chains()?)
    } else {
        None
    };

    let output = StatsOutput {
        backend: adapter.backend_kind().to_string(),
        statistics,
        incomplete_chains,
    };
    if args.json {
        return print_json(&output);
    }

    let stats = &output.statistics;
    println!("Backend:    {}", output.backend);
    println!("Tags:       {}", stats.total_tags);
    println!("References: {}", stats.total_references);
    println!("By category:");
    for (category, count) in &stats.by_category {
        println!("  {category:<10} {count}");
    }
    if !stats.top_files.is_empty() {
        println!("Top files:");
        for file in &stats.top_files {
            println!("  {:>5}  {}", file.tag_count, file.file_path);
        }
    }
    if let Some(chains) = &output.incomplete_chains {
        println!("Incomplete chains: {}", chains.len());
        for chain in chains {
            println!(
                "  {}: has {}, missing {}",
                chain.identifier,
                chain.present.join(", "),
                chain.missing.join(", ")
            );
        }
    }
    Ok(())
}
