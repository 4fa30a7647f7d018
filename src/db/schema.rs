//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::TrackerError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), TrackerError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, TrackerError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| TrackerError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), TrackerError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| TrackerError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| TrackerError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), TrackerError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| TrackerError::Internal(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(PROJECT_SCHEMA)
        .map_err(|e| TrackerError::Internal(format!("Failed to create project tables: {}", e)))?;

    conn.execute_batch(RECORD_SCHEMA)
        .map_err(|e| TrackerError::Internal(format!("Failed to create record tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| TrackerError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), TrackerError> {
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Location hierarchy and indicator catalogs
///
/// Every catalog row carries its display name plus `name_norm`, the
/// trimmed/upper-cased/diacritic-stripped form used for all equality
/// comparisons. UNIQUE constraints are declared on the normalized
/// form so the store itself enforces scoped uniqueness.
const CATALOG_SCHEMA: &str = r#"
-- Municipalities: name unique globally
CREATE TABLE IF NOT EXISTS municipalities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL UNIQUE
);

-- Institutions: name unique only within a municipality
CREATE TABLE IF NOT EXISTS institutions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL,
    municipality_id INTEGER NOT NULL,
    FOREIGN KEY (municipality_id) REFERENCES municipalities(id),
    UNIQUE (name_norm, municipality_id)
);

-- Sites: name unique only within an institution
CREATE TABLE IF NOT EXISTS sites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL,
    institution_id INTEGER NOT NULL,
    FOREIGN KEY (institution_id) REFERENCES institutions(id),
    UNIQUE (name_norm, institution_id)
);

-- Flat indicator catalog, seeded at first run
CREATE TABLE IF NOT EXISTS indicators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL UNIQUE
);
"#;

/// Projects and their activities
const PROJECT_SCHEMA: &str = r#"
-- Projects. code is optional but unique when present; an empty code
-- is stored as NULL, never as the empty string.
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT UNIQUE,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL UNIQUE,
    contract_year INTEGER NOT NULL DEFAULT 0,
    contractor TEXT,

    -- Four independent funding components plus the derived total and
    -- the derived textual list of active sources
    rp_amount REAL NOT NULL DEFAULT 0,
    sgp_amount REAL NOT NULL DEFAULT 0,
    men_amount REAL NOT NULL DEFAULT 0,
    sgr_amount REAL NOT NULL DEFAULT 0,
    total_amount REAL NOT NULL DEFAULT 0,
    funding_sources TEXT
);

-- Activities: description unique only within a project
CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    description TEXT NOT NULL,
    description_norm TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id),
    UNIQUE (project_id, description_norm)
);
"#;

/// Progress records: append-only history, never updated or deleted
const RECORD_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS progress_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    activity_id INTEGER,
    site_id INTEGER,
    indicator_id INTEGER,
    percent_complete REAL NOT NULL DEFAULT 0,
    record_date TEXT NOT NULL,
    responsible TEXT,
    notes TEXT,
    is_addition INTEGER NOT NULL DEFAULT 0,
    addition_amount REAL NOT NULL DEFAULT 0,
    addition_source TEXT,
    FOREIGN KEY (project_id) REFERENCES projects(id),
    FOREIGN KEY (activity_id) REFERENCES activities(id),
    FOREIGN KEY (site_id) REFERENCES sites(id),
    FOREIGN KEY (indicator_id) REFERENCES indicators(id)
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_institutions_municipality ON institutions(municipality_id);
CREATE INDEX IF NOT EXISTS idx_sites_institution ON sites(institution_id);
CREATE INDEX IF NOT EXISTS idx_activities_project ON activities(project_id);

CREATE INDEX IF NOT EXISTS idx_records_project ON progress_records(project_id);
CREATE INDEX IF NOT EXISTS idx_records_activity ON progress_records(activity_id);
CREATE INDEX IF NOT EXISTS idx_records_site ON progress_records(site_id);
CREATE INDEX IF NOT EXISTS idx_records_date ON progress_records(record_date);
"#;
