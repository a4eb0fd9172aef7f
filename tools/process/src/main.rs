/// Classification trigger: runs the dataset processor over every complete,
/// not yet processed hazardset (or one hazardset) and writes the outputs to
/// the catalog.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use hazard_core::raster::GeoTiffOpener;
use hazard_core::telemetry::{init_tracing, level_for};
use hazard_core::{DatasetProcessor, JsonStore, ProcessOptions, Settings};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "process", about = "Classify administrative divisions against complete hazardsets")]
struct Args {
    /// Process only this hazardset (omit to process all pending hazardsets)
    #[arg(long)]
    hazardset_id: Option<String>,

    /// Reprocess hazardsets that are already marked processed
    #[arg(short, long)]
    force: bool,

    /// Compute everything, then roll back
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
    let options = ProcessOptions {
        hazardset_id: args.hazardset_id,
        force: args.force,
        dry_run: args.dry_run,
    };

    let report = DatasetProcessor::new(&store, &GeoTiffOpener, &settings)
        .process(&options)
        .with_context(|| format!("reading catalog {}", args.catalog.display()))?;

    info!("{report}");
    if !report.is_success() {
        bail!("{} hazardset(s) failed, see log for details", report.failures.len());
    }
    Ok(())
}
