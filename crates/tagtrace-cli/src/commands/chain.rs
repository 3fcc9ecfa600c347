//! Chain command - traceability tree around one tag

use anyhow::{Context as _, Result};
use clap::Args;
use tagtrace_backend::ChainNodeInfo;
use tagtrace_core::search::chain::DEFAULT_MAX_DEPTH;
use tagtrace_core::Direction;

use super::{print_json, Context};

/// Arguments for the chain command
#[derive(Args, Debug)]
pub struct ChainArgs {
    /// Tag key, e.g. REQ:AUTH-01
    key: String,

    /// forward (down), backward (up) or both
    #[arg(long, short = 'd', default_value = "forward")]
    direction: Direction,

    /// Maximum traversal depth
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Print the chain as JSON
    #[arg(long)]
    json: bool,
}

fn print_node(node: &ChainNodeInfo) {
    let arrow = match node.relation.as_str() {
        "forward" => "→ ",
        "backward" => "← ",
        _ => "",
    };
    println!(
        "{}{arrow}{}  ({}:{}){}",
        "  ".repeat(node.depth),
        node.key,
        node.file_path,
        node.line_number,
        node.description
            .as_deref()
            .map(|d| format!("  {d}"))
            .unwrap_or_default()
    );
    for child in &node.children {
        print_node(child);
    }
}

/// Execute the chain command
pub fn execute(args: ChainArgs, ctx: &Context) -> Result<()> {
    let adapter = ctx.adapter()?;
    let key = args.key.to_uppercase();
    let chain = adapter
        .get_traceability_chain(&key, args.direction, args.max_depth)
        .with_context(|| format!("Failed to trace {key}"))?;

    if args.json {
        return print_json(&chain);
    }

    let Some(root) = &chain.root else {
        anyhow::bail!("Tag {key} not found");
    };
    print_node(root);

    if chain.truncated && !ctx.quiet {
        eprintln!("(truncated at depth {})", chain.max_depth);
    }
    if let Some(reason) = &chain.unavailable_reason {
        if !ctx.quiet {
            eprintln!("warning: {reason}; showing the tag only");
        }
    }
    Ok(())
}
