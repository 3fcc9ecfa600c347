//! Analyze command - validator report over all tags

use anyhow::{Context as _, Result};
use clap::Args;
use tagtrace_core::{analyze, AnalysisReport};

use super::{print_json, Context};
use crate::progress::{finish_spinner, spinner};

/// Arguments for the analyze command
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Analyze the working tree directly instead of the stored index
    #[arg(long)]
    scan: bool,

    /// Exit with an error when cycles, broken references or naming problems are found
    #[arg(long)]
    fail_on_issues: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn print_report(report: &AnalysisReport, verbose: bool) {
    println!(
        "Tags: {} ({} unique keys)",
        report.total_tags, report.unique_keys
    );
    println!(
        "Primary chain: {:.0}% complete{}",
        report.primary_chain.completeness_score * 100.0,
        if report.primary_chain.missing_categories.is_empty() {
            String::new()
        } else {
            format!(
                ", missing {}",
                report.primary_chain.missing_categories.join(", ")
            )
        }
    );

    println!("Coverage:");
    for (family, ratio) in &report.coverage {
        println!("  {:<12} {:>5.1}%", family.to_string(), ratio * 100.0);
    }

    println!("Cycles: {}", report.cycles.len());
    for cycle in &report.cycles {
        println!("  {}", cycle.join(" → "));
    }

    println!("Self references: {}", report.self_references.len());
    for key in &report.self_references {
        println!("  {key}");
    }

    println!("Broken references: {}", report.broken_references.len());
    for broken in &report.broken_references {
        println!("  {} → {} ({})", broken.source, broken.target, broken.reason);
    }

    println!("Naming violations: {}", report.naming_violations.len());
    for v in &report.naming_violations {
        match &v.suggestion {
            Some(suggestion) => println!("  {}: {} (suggest {suggestion})", v.key, v.message),
            None => println!("  {}: {}", v.key, v.message),
        }
    }

    println!("Orphans: {}", report.orphans.len());
    if verbose {
        for key in &report.orphans {
            println!("  {key}");
        }
    }
}

/// Execute the analyze command
pub fn execute(args: AnalyzeArgs, ctx: &Context) -> Result<()> {
    let pb = spinner("Analyzing tags...", ctx.quiet || args.json);

    let report = if args.scan {
        let scanner = tagtrace_backend::scanner_from_config(&ctx.config.scan);
        let scan = scanner
            .scan(&ctx.project)
            .context("Failed to scan project")?;
        analyze(&scan.tag_graph())
    } else {
        ctx.adapter()?.analyze().context("Failed to analyze tags")?
    };

    finish_spinner(pb, &format!("Analyzed {} tags", report.total_tags));

    if args.json {
        print_json(&report)?;
    } else {
        print_report(&report, ctx.verbose);
    }

    if args.fail_on_issues && !report.is_healthy() {
        anyhow::bail!("analysis found problems");
    }
    Ok(())
}
