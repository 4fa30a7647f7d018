//! Progress-record storage operations
//!
//! Records are append-only history: progress updates insert a new row,
//! existing rows are never mutated or deleted.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::dates;
use crate::error::TrackerError;

/// Input for inserting a progress record
#[derive(Debug, Clone, Default)]
pub struct NewRecord {
    pub project_id: i64,
    pub activity_id: Option<i64>,
    pub site_id: Option<i64>,
    pub indicator_id: Option<i64>,
    pub percent_complete: f64,
    pub record_date: String,
    pub responsible: Option<String>,
    pub notes: Option<String>,
    pub is_addition: bool,
    pub addition_amount: f64,
    pub addition_source: Option<String>,
}

/// Insert a progress record. Free-text fields are stored upper-cased.
pub fn insert_record(conn: &Connection, input: &NewRecord) -> Result<i64, TrackerError> {
    conn.execute(
        r#"
        INSERT INTO progress_records (
            project_id, activity_id, site_id, indicator_id,
            percent_complete, record_date, responsible, notes,
            is_addition, addition_amount, addition_source
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            input.project_id,
            input.activity_id,
            input.site_id,
            input.indicator_id,
            input.percent_complete,
            input.record_date,
            input.responsible.as_deref().map(str::to_uppercase),
            input.notes.as_deref().map(str::to_uppercase),
            input.is_addition as i64,
            input.addition_amount,
            input.addition_source.as_deref().map(str::to_uppercase),
        ],
    )
    .map_err(|e| TrackerError::Internal(format!("Record insert failed: {}", e)))?;

    Ok(conn.last_insert_rowid())
}

/// Most recent tracking for an activity, joined up the location chain.
/// Used by the form to pre-fill location and responsible fields.
#[derive(Debug, Clone, Serialize)]
pub struct LastTracking {
    pub activity_id: i64,
    pub site_id: Option<i64>,
    pub indicator_id: Option<i64>,
    pub responsible: Option<String>,
    pub notes: Option<String>,
    pub institution_id: Option<i64>,
    pub municipality_id: Option<i64>,
}

pub fn last_tracking_for_activity(
    conn: &Connection,
    activity_id: i64,
) -> Result<Option<LastTracking>, TrackerError> {
    conn.query_row(
        r#"
        SELECT
            r.activity_id, r.site_id, r.indicator_id, r.responsible, r.notes,
            s.institution_id, i.municipality_id
        FROM progress_records r
        LEFT JOIN sites s ON r.site_id = s.id
        LEFT JOIN institutions i ON s.institution_id = i.id
        WHERE r.activity_id = ?
        ORDER BY r.id DESC
        LIMIT 1
        "#,
        params![activity_id],
        |row| {
            Ok(LastTracking {
                activity_id: row.get(0)?,
                site_id: row.get(1)?,
                indicator_id: row.get(2)?,
                responsible: row.get(3)?,
                notes: row.get(4)?,
                institution_id: row.get(5)?,
                municipality_id: row.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| TrackerError::Internal(format!("Last tracking lookup failed: {}", e)))
}

/// One row of the denormalized export listing
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub code: Option<String>,
    pub contract_year: i64,
    pub project_name: String,
    pub contractor: Option<String>,
    pub activity: Option<String>,
    pub municipality: Option<String>,
    pub institution: Option<String>,
    pub site: Option<String>,
    pub indicator: Option<String>,
    pub total_amount: f64,
    pub rp_amount: f64,
    pub sgp_amount: f64,
    pub men_amount: f64,
    pub sgr_amount: f64,
    pub funding_sources: Option<String>,
    pub is_addition: bool,
    pub addition_amount: f64,
    pub addition_source: Option<String>,
    pub percent_complete: f64,
    pub record_date: String,
    pub responsible: Option<String>,
    pub notes: Option<String>,
}

impl ExportRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            code: row.get("code")?,
            contract_year: row.get("contract_year")?,
            project_name: row.get("project_name")?,
            contractor: row.get("contractor")?,
            activity: row.get("activity")?,
            municipality: row.get("municipality")?,
            institution: row.get("institution")?,
            site: row.get("site")?,
            indicator: row.get("indicator")?,
            total_amount: row.get("total_amount")?,
            rp_amount: row.get("rp_amount")?,
            sgp_amount: row.get("sgp_amount")?,
            men_amount: row.get("men_amount")?,
            sgr_amount: row.get("sgr_amount")?,
            funding_sources: row.get("funding_sources")?,
            is_addition: row.get::<_, i64>("is_addition")? != 0,
            addition_amount: row.get("addition_amount")?,
            addition_source: row.get("addition_source")?,
            percent_complete: row.get("percent_complete")?,
            record_date: row.get("record_date")?,
            responsible: row.get("responsible")?,
            notes: row.get("notes")?,
        })
    }
}

/// Full denormalized listing of every progress record, newest first
pub fn export_rows(conn: &Connection) -> Result<Vec<ExportRow>, TrackerError> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                p.code, p.contract_year, p.name AS project_name, p.contractor,
                a.description AS activity,
                m.name AS municipality, i.name AS institution, s.name AS site,
                ind.name AS indicator,
                p.total_amount, p.rp_amount, p.sgp_amount, p.men_amount, p.sgr_amount,
                p.funding_sources,
                r.is_addition, r.addition_amount, r.addition_source,
                r.percent_complete, r.record_date, r.responsible, r.notes
            FROM progress_records r
            JOIN projects p ON r.project_id = p.id
            LEFT JOIN activities a ON r.activity_id = a.id
            LEFT JOIN sites s ON r.site_id = s.id
            LEFT JOIN institutions i ON s.institution_id = i.id
            LEFT JOIN municipalities m ON i.municipality_id = m.id
            LEFT JOIN indicators ind ON r.indicator_id = ind.id
            ORDER BY r.id DESC
            "#,
        )
        .map_err(|e| TrackerError::Internal(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| ExportRow::from_row(row))
        .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(rows)
}

/// Aggregate totals for the summary cards
#[derive(Debug, Clone, Serialize)]
pub struct GeneralStats {
    pub project_count: i64,
    pub total_investment: f64,
    pub site_count: i64,
    pub average_percent: f64,
}

pub fn general_stats(conn: &Connection) -> Result<GeneralStats, TrackerError> {
    conn.query_row(
        r#"
        SELECT
            (SELECT COUNT(*) FROM projects),
            (SELECT COALESCE(SUM(total_amount), 0) FROM projects),
            (SELECT COUNT(*) FROM sites),
            (SELECT COALESCE(AVG(percent_complete), 0) FROM progress_records)
        "#,
        [],
        |row| {
            Ok(GeneralStats {
                project_count: row.get(0)?,
                total_investment: row.get(1)?,
                site_count: row.get(2)?,
                average_percent: row.get(3)?,
            })
        },
    )
    .map_err(|e| TrackerError::Internal(format!("Stats query failed: {}", e)))
}

/// Optional filters for the evolution series
#[derive(Debug, Clone, Default)]
pub struct EvolutionFilters {
    pub project_id: Option<i64>,
    pub municipality_id: Option<i64>,
    pub site_id: Option<i64>,
    pub indicator_id: Option<i64>,
}

/// Average percent complete per record date
#[derive(Debug, Clone, Serialize)]
pub struct EvolutionPoint {
    pub record_date: String,
    pub average_percent: f64,
}

/// Average progress grouped by record date, chronologically ordered
pub fn evolution(
    conn: &Connection,
    filters: &EvolutionFilters,
) -> Result<Vec<EvolutionPoint>, TrackerError> {
    let mut sql = String::from(
        r#"
        SELECT r.record_date, AVG(r.percent_complete)
        FROM progress_records r
        LEFT JOIN sites s ON r.site_id = s.id
        LEFT JOIN institutions i ON s.institution_id = i.id
        WHERE 1=1
        "#,
    );
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

    if let Some(id) = filters.project_id {
        sql.push_str(" AND r.project_id = ?");
        params.push(Box::new(id));
    }
    if let Some(id) = filters.municipality_id {
        sql.push_str(" AND i.municipality_id = ?");
        params.push(Box::new(id));
    }
    if let Some(id) = filters.site_id {
        sql.push_str(" AND r.site_id = ?");
        params.push(Box::new(id));
    }
    if let Some(id) = filters.indicator_id {
        sql.push_str(" AND r.indicator_id = ?");
        params.push(Box::new(id));
    }

    sql.push_str(" GROUP BY r.record_date");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| TrackerError::Internal(format!("Prepare failed: {}", e)))?;

    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

    let mut points = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(EvolutionPoint {
                record_date: row.get(0)?,
                average_percent: row.get(1)?,
            })
        })
        .map_err(|e| TrackerError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TrackerError::Internal(format!("Row parse failed: {}", e)))?;

    // Dates are D/M/YYYY text; sort numerically rather than lexically
    points.sort_by_key(|p| dates::sort_key(&p.record_date));

    Ok(points)
}
