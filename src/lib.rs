//! Obra Tracker - progress tracking core for regional infrastructure
//! and education projects
//!
//! Tracks project progress across a geographic-institutional hierarchy
//! (municipality → institution → site) with periodic progress records.
//! The surrounding application (HTTP routing, HTML views, charts,
//! upload plumbing) is an external collaborator; this crate owns the
//! parts with real invariants:
//!
//! - **Catalog resolvers**: resolve-or-create for municipalities,
//!   institutions (scoped to a municipality) and sites (scoped to an
//!   institution), always comparing normalized names
//! - **Project resolution**: exact code match, then exact
//!   normalized-name match among substring candidates, then creation,
//!   with funding-component aggregation
//! - **Ingestion pipeline**: spreadsheet-shaped rows processed in
//!   order with per-row failure isolation and header-alias matching
//! - **Seed loader**: idempotent first-run population of the
//!   reference catalogs from bundled tables
//! - **Progress records**: append-only history with a denormalized
//!   export listing
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//! ├── tracker.db     # SQLite store (catalogs, projects, records)
//! └── config.toml    # Configuration
//! ```

pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod import;
pub mod normalize;
pub mod seed;
pub mod services;

// Re-exports
pub use config::Config;
pub use db::TrackerDb;
pub use error::TrackerError;
pub use import::{ImportPipeline, ImportReport};
pub use seed::{SeedLoader, SeedReport};
pub use services::{
    CatalogService, FundingBreakdown, LocationRef, ProjectService, SaveOutcome, SaveRequest,
    TrackingService,
};
