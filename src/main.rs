//! Obra Tracker CLI
//!
//! Opens the tracking store, seeds the reference catalogs on first
//! run, and optionally runs a bulk import or writes the denormalized
//! export listing.
//!
//! ## Usage
//!
//! ```bash
//! # Initialize the store and seed the catalogs
//! obra-tracker
//!
//! # Custom data directory
//! obra-tracker --data-dir /data/tracker
//!
//! # Bulk import a converted workbook sheet
//! obra-tracker --import seguimiento.json
//!
//! # Write the export listing
//! obra-tracker --export reporte.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use obra_tracker::db::records;
use obra_tracker::{Config, ImportPipeline, SeedLoader, TrackerDb};

#[derive(Parser, Debug)]
#[command(name = "obra-tracker")]
#[command(about = "Progress tracking core for regional infrastructure and education projects")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for the SQLite store
    #[arg(long, env = "OBRA_TRACKER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Import a JSON rows file (converted workbook sheet)
    #[arg(long)]
    import: Option<PathBuf>,

    /// Write the denormalized export listing to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Skip reference-catalog seeding
    #[arg(long)]
    no_seed: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("obra_tracker=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("loading config from {}", config_path.display()))?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    info!(data_dir = %config.data_dir.display(), "Starting obra-tracker");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(TrackerDb::open(&config.data_dir)?);

    // First-run seeding, gated on the indicator catalog
    if config.seed_on_start && !args.no_seed {
        let report = SeedLoader::new(Arc::clone(&db)).run()?;
        if report.skipped {
            info!("Reference catalogs already seeded");
        }
    }

    if let Some(path) = &args.import {
        let pipeline = ImportPipeline::new(Arc::clone(&db));
        let report = pipeline
            .import_file(path)
            .with_context(|| format!("importing {}", path.display()))?;
        for error in &report.errors {
            warn!("{}", error);
        }
        println!("{}", report.summary());
    }

    if let Some(path) = &args.export {
        let rows = db.with_conn(records::export_rows)?;
        std::fs::write(path, serde_json::to_string_pretty(&rows)?)
            .with_context(|| format!("writing export to {}", path.display()))?;
        info!(rows = rows.len(), path = %path.display(), "Export written");
    }

    let stats = db.stats()?;
    info!(
        projects = stats.project_count,
        municipalities = stats.municipality_count,
        sites = stats.site_count,
        records = stats.record_count,
        "Store ready"
    );

    Ok(())
}
