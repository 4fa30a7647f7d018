//! Project storage operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::map_insert_err;
use crate::error::TrackerError;

/// Project row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: i64,
    pub code: Option<String>,
    pub name: String,
    pub contract_year: i64,
    pub contractor: Option<String>,
    pub rp_amount: f64,
    pub sgp_amount: f64,
    pub men_amount: f64,
    pub sgr_amount: f64,
    pub total_amount: f64,
    pub funding_sources: Option<String>,
}

impl ProjectRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            name: row.get("name")?,
            contract_year: row.get("contract_year")?,
            contractor: row.get("contractor")?,
            rp_amount: row.get("rp_amount")?,
            sgp_amount: row.get("sgp_amount")?,
            men_amount: row.get("men_amount")?,
            sgr_amount: row.get("sgr_amount")?,
            total_amount: row.get("total_amount")?,
            funding_sources: row.get("funding_sources")?,
        })
    }
}

/// Input for inserting a project; all derived fields already resolved
#[derive(Debug, Clone)]
pub struct NewProjectRow {
    pub code: Option<String>,
    pub name: String,
    pub name_norm: String,
    pub contract_year: i64,
    pub contractor: Option<String>,
    pub rp_amount: f64,
    pub sgp_amount: f64,
    pub men_amount: f64,
    pub sgr_amount: f64,
    pub total_amount: f64,
    pub funding_sources: String,
}

/// Get a project by id
pub fn get_project(conn: &Connection, id: i64) -> Result<Option<ProjectRow>, TrackerError> {
    conn.query_row("SELECT * FROM projects WHERE id = ?", params![id], |row| {
        ProjectRow::from_row(row)
    })
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Project lookup failed: {}", e)))
}

/// Exact-code lookup; the code is never matched when absent
pub fn find_by_code(conn: &Connection, code: &str) -> Result<Option<ProjectRow>, TrackerError> {
    conn.query_row(
        "SELECT * FROM projects WHERE code = ?",
        params![code],
        |row| ProjectRow::from_row(row),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Project code lookup failed: {}", e)))
}

/// Exact lookup by normalized name
pub fn find_by_name_norm(
    conn: &Connection,
    name_norm: &str,
) -> Result<Option<ProjectRow>, TrackerError> {
    conn.query_row(
        "SELECT * FROM projects WHERE name_norm = ?",
        params![name_norm],
        |row| ProjectRow::from_row(row),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Project name lookup failed: {}", e)))
}

/// Substring search over code OR name. Results are candidates only,
/// never authoritative identity.
pub fn search_candidates(
    conn: &Connection,
    query: &str,
    limit: u32,
) -> Result<Vec<ProjectRow>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT * FROM projects WHERE code LIKE ? OR name LIKE ? LIMIT ?")
        .map_err(|e| TrackerError::Internal(format!("Prepare failed: {}", e)))?;

    let pattern = format!("%{}%", query);
    let rows = stmt
        .query_map(params![pattern, pattern, limit], |row| ProjectRow::from_row(row))
        .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Insert a project
pub fn insert_project(conn: &Connection, input: &NewProjectRow) -> Result<i64, TrackerError> {
    conn.execute(
        r#"
        INSERT INTO projects (
            code, name, name_norm, contract_year, contractor,
            rp_amount, sgp_amount, men_amount, sgr_amount,
            total_amount, funding_sources
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            input.code,
            input.name,
            input.name_norm,
            input.contract_year,
            input.contractor,
            input.rp_amount,
            input.sgp_amount,
            input.men_amount,
            input.sgr_amount,
            input.total_amount,
            input.funding_sources,
        ],
    )
    .map_err(|e| map_insert_err("Project insert failed", e))?;

    Ok(conn.last_insert_rowid())
}
