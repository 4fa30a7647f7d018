//! Catalog lookups and inserts for the location hierarchy and indicators
//!
//! All lookups take the pre-normalized form of the name; callers are
//! expected to go through [`crate::normalize::normalize`] first. The
//! resolvers in the service layer own the create-vs-reuse decision;
//! this module is plain storage access.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::map_insert_err;
use crate::error::TrackerError;

/// A catalog row (id + display name), as listed for the form
#[derive(Debug, Clone, Serialize)]
pub struct CatalogRow {
    pub id: i64,
    pub name: String,
}

// =========================================================================
// Municipalities
// =========================================================================

pub fn find_municipality(conn: &Connection, name_norm: &str) -> Result<Option<i64>, TrackerError> {
    conn.query_row(
        "SELECT id FROM municipalities WHERE name_norm = ?",
        params![name_norm],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Municipality lookup failed: {}", e)))
}

pub fn insert_municipality(
    conn: &Connection,
    name: &str,
    name_norm: &str,
) -> Result<i64, TrackerError> {
    conn.execute(
        "INSERT INTO municipalities (name, name_norm) VALUES (?, ?)",
        params![name, name_norm],
    )
    .map_err(|e| map_insert_err("Municipality insert failed", e))?;

    Ok(conn.last_insert_rowid())
}

pub fn list_municipalities(conn: &Connection) -> Result<Vec<CatalogRow>, TrackerError> {
    list_catalog(
        conn,
        "SELECT id, name FROM municipalities ORDER BY name",
        params![],
    )
}

// =========================================================================
// Institutions (scoped to a municipality)
// =========================================================================

pub fn find_institution(
    conn: &Connection,
    name_norm: &str,
    municipality_id: i64,
) -> Result<Option<i64>, TrackerError> {
    conn.query_row(
        "SELECT id FROM institutions WHERE name_norm = ? AND municipality_id = ?",
        params![name_norm, municipality_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Institution lookup failed: {}", e)))
}

pub fn insert_institution(
    conn: &Connection,
    name: &str,
    name_norm: &str,
    municipality_id: i64,
) -> Result<i64, TrackerError> {
    conn.execute(
        "INSERT INTO institutions (name, name_norm, municipality_id) VALUES (?, ?, ?)",
        params![name, name_norm, municipality_id],
    )
    .map_err(|e| map_insert_err("Institution insert failed", e))?;

    Ok(conn.last_insert_rowid())
}

pub fn list_institutions(
    conn: &Connection,
    municipality_id: i64,
) -> Result<Vec<CatalogRow>, TrackerError> {
    list_catalog(
        conn,
        "SELECT id, name FROM institutions WHERE municipality_id = ? ORDER BY name",
        params![municipality_id],
    )
}

// =========================================================================
// Sites (scoped to an institution)
// =========================================================================

pub fn find_site(
    conn: &Connection,
    name_norm: &str,
    institution_id: i64,
) -> Result<Option<i64>, TrackerError> {
    conn.query_row(
        "SELECT id FROM sites WHERE name_norm = ? AND institution_id = ?",
        params![name_norm, institution_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Site lookup failed: {}", e)))
}

pub fn insert_site(
    conn: &Connection,
    name: &str,
    name_norm: &str,
    institution_id: i64,
) -> Result<i64, TrackerError> {
    conn.execute(
        "INSERT INTO sites (name, name_norm, institution_id) VALUES (?, ?, ?)",
        params![name, name_norm, institution_id],
    )
    .map_err(|e| map_insert_err("Site insert failed", e))?;

    Ok(conn.last_insert_rowid())
}

pub fn list_sites(conn: &Connection, institution_id: i64) -> Result<Vec<CatalogRow>, TrackerError> {
    list_catalog(
        conn,
        "SELECT id, name FROM sites WHERE institution_id = ? ORDER BY name",
        params![institution_id],
    )
}

// =========================================================================
// Indicators
// =========================================================================

pub fn find_indicator(conn: &Connection, name_norm: &str) -> Result<Option<i64>, TrackerError> {
    conn.query_row(
        "SELECT id FROM indicators WHERE name_norm = ?",
        params![name_norm],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Indicator lookup failed: {}", e)))
}

pub fn list_indicators(conn: &Connection) -> Result<Vec<CatalogRow>, TrackerError> {
    list_catalog(conn, "SELECT id, name FROM indicators ORDER BY name", params![])
}

/// Full indicator catalog keyed by normalized name, loaded once per
/// import run for in-memory matching.
pub fn indicator_index(
    conn: &Connection,
) -> Result<std::collections::HashMap<String, i64>, TrackerError> {
    let mut stmt = conn
        .prepare("SELECT name_norm, id FROM indicators")
        .map_err(|e| TrackerError::Internal(format!("Prepare failed: {}", e)))?;

    let pairs = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(pairs.into_iter().collect())
}

pub fn indicator_count(conn: &Connection) -> Result<i64, TrackerError> {
    conn.query_row("SELECT COUNT(*) FROM indicators", [], |row| row.get(0))
        .map_err(|e| TrackerError::Internal(format!("Indicator count failed: {}", e)))
}

// =========================================================================
// Shared
// =========================================================================

fn list_catalog<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<CatalogRow>, TrackerError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| TrackerError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map(params, |row| {
            Ok(CatalogRow {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}
