//! Activity storage operations

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::map_insert_err;
use crate::error::TrackerError;

/// Activity row from database
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRow {
    pub id: i64,
    pub project_id: i64,
    pub description: String,
}

/// List a project's activities
pub fn list_for_project(
    conn: &Connection,
    project_id: i64,
) -> Result<Vec<ActivityRow>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT id, project_id, description FROM activities WHERE project_id = ?")
        .map_err(|e| TrackerError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params![project_id], |row| {
            Ok(ActivityRow {
                id: row.get(0)?,
                project_id: row.get(1)?,
                description: row.get(2)?,
            })
        })
        .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Exact lookup by normalized description within a project
pub fn find_by_description(
    conn: &Connection,
    project_id: i64,
    description_norm: &str,
) -> Result<Option<i64>, TrackerError> {
    conn.query_row(
        "SELECT id FROM activities WHERE project_id = ? AND description_norm = ?",
        params![project_id, description_norm],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Activity lookup failed: {}", e)))
}

/// Insert an activity
pub fn insert_activity(
    conn: &Connection,
    project_id: i64,
    description: &str,
    description_norm: &str,
) -> Result<i64, TrackerError> {
    conn.execute(
        "INSERT INTO activities (project_id, description, description_norm) VALUES (?, ?, ?)",
        params![project_id, description, description_norm],
    )
    .map_err(|e| map_insert_err("Activity insert failed", e))?;

    Ok(conn.last_insert_rowid())
}
