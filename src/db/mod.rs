//! SQLite database module for the tracking store
//!
//! Single shared store for the reference catalogs (municipalities,
//! institutions, sites, indicators), projects with their activities,
//! and the append-only progress-record history.
//!
//! ## Tables
//!
//! - `municipalities` / `institutions` / `sites` - location hierarchy,
//!   uniqueness scoped to the parent level
//! - `indicators` - flat lookup catalog, seeded at first run
//! - `projects` - projects with funding components
//! - `activities` - activity descriptions scoped to a project
//! - `progress_records` - append-only progress history

pub mod activities;
pub mod catalog;
pub mod projects;
pub mod records;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::TrackerError;

/// SQLite database for catalogs, projects and progress records
pub struct TrackerDb {
    conn: Mutex<Connection>,
}

impl TrackerDb {
    /// Open or create the tracking database
    pub fn open(data_dir: &Path) -> Result<Self, TrackerError> {
        let db_path = data_dir.join("tracker.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| TrackerError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TrackerError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TrackerError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| TrackerError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), TrackerError> {
        let conn = self.conn.lock()
            .map_err(|e| TrackerError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&Connection) -> Result<T, TrackerError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| TrackerError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, TrackerError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TrackerError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| TrackerError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, TrackerError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, TrackerError> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?;
                Ok(n as u64)
            };

            Ok(DbStats {
                project_count: count("SELECT COUNT(*) FROM projects")?,
                municipality_count: count("SELECT COUNT(*) FROM municipalities")?,
                site_count: count("SELECT COUNT(*) FROM sites")?,
                indicator_count: count("SELECT COUNT(*) FROM indicators")?,
                record_count: count("SELECT COUNT(*) FROM progress_records")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub project_count: u64,
    pub municipality_count: u64,
    pub site_count: u64,
    pub indicator_count: u64,
    pub record_count: u64,
}

/// Map a rusqlite error from an insert, turning UNIQUE-constraint
/// failures into [`TrackerError::Conflict`] so resolvers can recover
/// by re-querying the scope.
pub(crate) fn map_insert_err(context: &str, e: rusqlite::Error) -> TrackerError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            TrackerError::Conflict(format!("{}: {}", context, e))
        }
        _ => TrackerError::Internal(format!("{}: {}", context, e)),
    }
}

// Re-exports
pub use activities::ActivityRow;
pub use catalog::CatalogRow;
pub use projects::{NewProjectRow, ProjectRow};
pub use records::{EvolutionFilters, EvolutionPoint, ExportRow, GeneralStats, LastTracking, NewRecord};
