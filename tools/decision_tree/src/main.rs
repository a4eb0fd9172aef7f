/// Decision tree trigger: recomputes the published division → hazard category
/// mapping from the current outputs, in one transaction.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hazard_core::telemetry::{init_tracing, level_for};
use hazard_core::{apply_decision_tree, JsonStore};

#[derive(Parser, Debug)]
#[command(name = "decision_tree", about = "Select one hazard category per division and upscale it")]
struct Args {
    /// Compute the mapping, then roll back
    #[arg(long)]
    dry_run: bool,

    /// Catalog JSON
    #[arg(long, env = "HAZARD_CATALOG", default_value = "data/catalog.json")]
    catalog: PathBuf,

    /// Log at DEBUG level
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as newline-delimited JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json, level_for(args.verbose));

    let store = JsonStore::new(&args.catalog);
    let summary = apply_decision_tree(&store, args.dry_run)
        .with_context(|| format!("decision tree on {}", args.catalog.display()))?;

    let upscaled: usize = summary.upscaled.iter().map(|(_, n)| n).sum();
    info!(
        "{} regional and {} upscaled categories published{}",
        summary.selected,
        upscaled,
        if summary.dry_run { " (dry run)" } else { "" }
    );
    Ok(())
}
