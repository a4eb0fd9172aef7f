/// Creates an empty catalog file.
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hazard_core::telemetry::{init_tracing, level_for};
use hazard_core::JsonStore;

#[derive(Parser, Debug)]
#[command(name = "initialize_db", about = "Create an empty hazard catalog")]
struct Args {
    /// Catalog JSON to create
    #[arg(long, env = "HAZARD_CATALOG", default_value = "data/catalog.json")]
    catalog: PathBuf,

    /// Replace an existing catalog
    #[arg(short, long)]
    force: bool,

    /// Log at DEBUG level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(false, level_for(args.verbose));

    if let Some(parent) = args.catalog.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = JsonStore::create_empty(&args.catalog, args.force)
        .with_context(|| format!("initialising {}", args.catalog.display()))?;

    info!("created {}", store.path().display());
    Ok(())
}
