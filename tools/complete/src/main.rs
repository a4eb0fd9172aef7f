/// Completion trigger: marks hazardsets whose required layers are all
/// downloaded as complete and aggregates layer metadata into them.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use hazard_core::completing::{complete, CompleteOptions};
use hazard_core::telemetry::{init_tracing, level_for};
use hazard_core::{JsonStore, Settings};

#[derive(Parser, Debug)]
#[command(name = "complete", about = "Flag hazardsets ready for classification")]
struct Args {
    /// Complete only this hazardset
    #[arg(long)]
    hazardset_id: Option<String>,

    /// Reset every hazardset to incomplete and unprocessed first
    #[arg(short, long)]
    force: bool,

    /// Check everything, then roll back
    #[arg(long)]
    dry_run: bool,

    /// Settings JSON
    #[arg(long, env = "HAZARD_SETTINGS", default_value = "settings.json")]
    settings: PathBuf,

    /// Optional local settings merged over the main file
    #[arg(long, default_value = "local_settings.json")]
    local_settings: PathBuf,

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

    let settings = Settings::load_with_local(&args.settings, Some(args.local_settings.as_path()))
        .with_context(|| format!("loading settings {}", args.settings.display()))?;
    let store = JsonStore::new(&args.catalog);
    let options = CompleteOptions {
        hazardset_id: args.hazardset_id,
        force: args.force,
        dry_run: args.dry_run,
    };

    let report = complete(&store, &settings, &options)
        .with_context(|| format!("reading catalog {}", args.catalog.display()))?;

    info!("{} hazardset(s) complete, {} failed", report.succeeded.len(), report.failures.len());
    if !report.is_success() {
        bail!("{} hazardset(s) could not be completed", report.failures.len());
    }
    Ok(())
}
