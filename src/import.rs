//! Bulk ingestion pipeline for spreadsheet-shaped rows
//!
//! Consumes the rows of an uploaded workbook sheet (converted by the
//! upload glue to a JSON array of header→cell objects) and drives the
//! resolvers over them in strict row order, so catalog rows created by
//! an earlier row are visible to later ones.
//!
//! ## Pipeline, per row
//!
//! 1. Normalize headers
//! 2. Skip rows with no project code and no project name
//! 3. Resolve the project (funding columns read through header aliases)
//! 4. Resolve the activity from the description column
//! 5. Resolve municipality → institution → site in sequence
//! 6. Match the indicator against the catalog snapshot
//! 7. Resolve the record date (serial, literal text, or today)
//! 8. Insert the progress record
//!
//! Any failure in steps 3-8 is recorded against the row's position and
//! processing continues; a single bad row never aborts the batch. Only
//! a failure to read the source file itself is fatal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::dates;
use crate::db::{catalog, records, NewRecord, TrackerDb};
use crate::error::TrackerError;
use crate::normalize::{normalize, normalize_row};
use crate::services::{CatalogService, FundingBreakdown, NewProject, ProjectService};

// ============================================================================
// Header aliases
// ============================================================================
//
// Ordered lists of accepted header spellings per logical field, matched
// against the normalized header form (whitespace stripped, upper-cased,
// diacritics removed). First match wins.

const CODE_ALIASES: &[&str] = &["CODIGOBPIN"];
const NAME_ALIASES: &[&str] = &["NOMBREDELPROYECTO"];
const YEAR_ALIASES: &[&str] = &["ANOCONTRATO"];
const CONTRACTOR_ALIASES: &[&str] = &["CONTRATISTA"];
const ACTIVITY_ALIASES: &[&str] = &["ACTIVIDADESACONTRATAR"];

const RP_ALIASES: &[&str] = &["VALORRP", "VALORR.P."];
const SGP_ALIASES: &[&str] = &["VALORSGP", "VALORS.G.P."];
const MEN_ALIASES: &[&str] = &["VALORMEN", "VALORM.E.N."];
const COFINANCING_ALIASES: &[&str] = &["VALORCOFINANCIACION", "VALORCOFINANCIACIONNACIONAL"];
const SGR_ALIASES: &[&str] = &["VALORSGR", "VALORS.G.R.", "VALORREGALIAS"];

const MUNICIPALITY_ALIASES: &[&str] = &["MUNICIPIO"];
const INSTITUTION_ALIASES: &[&str] = &["INSTITUCIONEDUCATIVABENEFICIADA", "INSTITUCION"];
const SITE_ALIASES: &[&str] = &["SEDEINSTITUCIONEDUCATIVABENEFICIADA", "SEDE"];

const INDICATOR_ALIASES: &[&str] = &["INDICADOR"];
const DATE_ALIASES: &[&str] = &["FECHASEGUIMIENTO"];
const RESPONSIBLE_ALIASES: &[&str] = &["RESPONSABLE"];
const NOTES_ALIASES: &[&str] = &["OBSERVACIONES"];
const PERCENT_ALIASES: &[&str] = &["%AVANCEFISICO", "%DEAVANCE"];
const ADDITION_ALIASES: &[&str] = &["ADICIONDERECURSOS2026", "VALORADICION"];
const ADDITION_SOURCE_ALIASES: &[&str] = &["FUENTEADICION"];

// ============================================================================
// Result
// ============================================================================

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Rows that produced a progress record
    pub processed: usize,
    /// Row-level failures, formatted "Row <n>: <detail>"
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        if self.errors.is_empty() {
            format!("Processed {} rows.", self.processed)
        } else {
            format!(
                "Processed {} rows, {} with errors.",
                self.processed,
                self.errors.len()
            )
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Drives the resolvers over a sequence of tabular rows
pub struct ImportPipeline {
    db: Arc<TrackerDb>,
    catalog: CatalogService,
    projects: ProjectService,
}

impl ImportPipeline {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self {
            catalog: CatalogService::new(Arc::clone(&db)),
            projects: ProjectService::new(Arc::clone(&db)),
            db,
        }
    }

    /// Read a rows file and run the pipeline over it. A file that
    /// cannot be opened or parsed aborts the whole import before any
    /// row is processed.
    pub fn import_file(&self, path: &Path) -> Result<ImportReport, TrackerError> {
        let rows = load_rows(path)?;
        self.run(rows)
    }

    /// Process rows strictly sequentially with per-row failure
    /// isolation
    pub fn run(&self, rows: Vec<Map<String, Value>>) -> Result<ImportReport, TrackerError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, rows = rows.len(), "Starting import run");

        // Indicator catalog snapshot, loaded once for the whole run
        let indicators = self.db.with_conn(catalog::indicator_index)?;

        let mut processed = 0usize;
        let mut errors = Vec::new();

        for (index, raw_row) in rows.iter().enumerate() {
            // 1-based data position plus the sheet's header row
            let row_number = index + 2;

            let row = normalize_row(raw_row);
            let code = text_field(&row, CODE_ALIASES);
            let name = text_field(&row, NAME_ALIASES);

            if code.is_none() && name.is_none() {
                // A fully blank trailing row is skipped silently; a row
                // with content but no identifier is a row error.
                if populated_count(&row) > 1 {
                    errors.push(format!("Row {}: empty row or missing identifiers", row_number));
                }
                continue;
            }

            match self.process_row(&row, code, name, &indicators) {
                Ok(()) => processed += 1,
                Err(e) => {
                    warn!(%run_id, row_number, error = %e, "Row failed");
                    errors.push(format!("Row {}: {}", row_number, e));
                }
            }
        }

        info!(%run_id, processed, errors = errors.len(), "Import run finished");

        Ok(ImportReport { processed, errors })
    }

    fn process_row(
        &self,
        row: &Map<String, Value>,
        code: Option<String>,
        name: Option<String>,
        indicators: &HashMap<String, i64>,
    ) -> Result<(), TrackerError> {
        // 1. Project
        let funding = FundingBreakdown {
            rp: number_field(row, RP_ALIASES),
            sgp: number_field(row, SGP_ALIASES),
            men: number_field(row, MEN_ALIASES),
            sgr: number_field(row, SGR_ALIASES),
        };
        let cofinancing = number_field(row, COFINANCING_ALIASES);
        let (funding, total, sources) = ProjectService::resolve_import_funding(funding, cofinancing);

        let project_id = self.projects.resolve_or_create(&NewProject {
            code,
            name: name.unwrap_or_default(),
            contract_year: number_field(row, YEAR_ALIASES) as i64,
            contractor: text_field(row, CONTRACTOR_ALIASES),
            funding,
            total_amount: total,
            funding_sources: sources,
        })?;

        // 2. Activity (left null when the description column is absent)
        let activity_id = match text_field(row, ACTIVITY_ALIASES) {
            Some(description) => Some(self.projects.resolve_activity(project_id, &description)?),
            None => None,
        };

        // 3. Location chain; each level resolves only under a resolved
        // parent
        let mut site_id = None;
        if let Some(municipality) = text_field(row, MUNICIPALITY_ALIASES) {
            let municipality_id = self.catalog.resolve_municipality(&municipality)?;
            if let Some(institution) = text_field(row, INSTITUTION_ALIASES) {
                let institution_id = self
                    .catalog
                    .resolve_institution(&institution, municipality_id)?;
                if let Some(site) = text_field(row, SITE_ALIASES) {
                    site_id = Some(self.catalog.resolve_site(&site, institution_id)?);
                }
            }
        }

        // 4. Indicator: normalized exact match against the snapshot,
        // never created here
        let indicator_id = text_field(row, INDICATOR_ALIASES)
            .and_then(|n| indicators.get(&normalize(&n)).copied());

        // 5. Record date
        let record_date = resolve_record_date(raw_field(row, DATE_ALIASES))?;

        // 6. Progress record
        let addition_amount = number_field(row, ADDITION_ALIASES);
        let record = NewRecord {
            project_id,
            activity_id,
            site_id,
            indicator_id,
            percent_complete: number_field(row, PERCENT_ALIASES),
            record_date,
            responsible: text_field(row, RESPONSIBLE_ALIASES),
            notes: text_field(row, NOTES_ALIASES),
            is_addition: addition_amount > 0.0,
            addition_amount,
            addition_source: text_field(row, ADDITION_SOURCE_ALIASES),
        };
        self.db.with_conn(|conn| records::insert_record(conn, &record))?;

        Ok(())
    }
}

// ============================================================================
// Source reading
// ============================================================================

/// Read a JSON rows file: one array of header→cell objects
pub fn load_rows(path: &Path) -> Result<Vec<Map<String, Value>>, TrackerError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        TrackerError::SourceUnreadable(format!("{}: {}", path.display(), e))
    })?;

    let value: Value = serde_json::from_str(&content)
        .map_err(|e| TrackerError::SourceUnreadable(format!("{}: {}", path.display(), e)))?;

    let items = match value {
        Value::Array(items) => items,
        _ => {
            return Err(TrackerError::SourceUnreadable(format!(
                "{}: expected an array of row objects",
                path.display()
            )))
        }
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(TrackerError::SourceUnreadable(format!(
                "{}: expected a row object, got {}",
                path.display(),
                other
            ))),
        })
        .collect()
}

// ============================================================================
// Cell access
// ============================================================================

/// First alias whose cell holds a non-empty value, as trimmed text
fn text_field(row: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        match row.get(*alias) {
            Some(Value::String(s)) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First alias whose cell parses as a number; 0 when none does
fn number_field(row: &Map<String, Value>, aliases: &[&str]) -> f64 {
    for alias in aliases {
        match row.get(*alias) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_f64() {
                    return v;
                }
            }
            Some(Value::String(s)) => {
                if let Ok(v) = s.trim().parse::<f64>() {
                    return v;
                }
            }
            _ => {}
        }
    }
    0.0
}

/// First alias with any present cell, untyped
fn raw_field<'a>(row: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| row.get(*alias))
}

/// Cells carrying actual content (not null, not blank text)
fn populated_count(row: &Map<String, Value>) -> usize {
    row.values()
        .filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
        .count()
}

/// Date cell resolution: numeric serials convert to calendar dates,
/// absent cells default to today, anything else is taken literally
fn resolve_record_date(cell: Option<&Value>) -> Result<String, TrackerError> {
    match cell {
        Some(Value::Number(n)) => {
            let serial = n.as_f64().unwrap_or(-1.0);
            dates::from_excel_serial(serial)
                .ok_or_else(|| TrackerError::Parse(format!("invalid date serial {}", serial)))
        }
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Ok(dates::today_dmy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline() -> (ImportPipeline, Arc<TrackerDb>) {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        (ImportPipeline::new(Arc::clone(&db)), db)
    }

    fn row(fields: &[(&str, Value)]) -> Map<String, Value> {
        let mut map = Map::new();
        for (key, value) in fields {
            map.insert(key.to_string(), value.clone());
        }
        map
    }

    fn valid_row(name: &str) -> Map<String, Value> {
        row(&[
            ("NOMBRE DEL PROYECTO", json!(name)),
            ("VALOR RP", json!(1_000_000)),
            ("ACTIVIDADES A CONTRATAR", json!("OBRA CIVIL")),
            ("MUNICIPIO", json!("NEIVA")),
            ("INSTITUCIÓN", json!("IE DEPARTAMENTAL")),
            ("SEDE", json!("SEDE PRINCIPAL")),
            ("FECHA SEGUIMIENTO", json!("10/2/2025")),
            ("% AVANCE FÍSICO", json!(35.5)),
            ("RESPONSABLE", json!("SUPERVISOR")),
        ])
    }

    #[test]
    fn a_valid_row_creates_the_full_chain() {
        let (pipeline, db) = pipeline();
        let report = pipeline.run(vec![valid_row("CONSTRUCCIÓN DE AULAS")]).unwrap();

        assert_eq!(report.processed, 1);
        assert!(report.errors.is_empty());

        let stats = db.stats().unwrap();
        assert_eq!(stats.project_count, 1);
        assert_eq!(stats.municipality_count, 1);
        assert_eq!(stats.site_count, 1);
        assert_eq!(stats.record_count, 1);
    }

    #[test]
    fn reimporting_the_same_name_reuses_the_project() {
        let (pipeline, db) = pipeline();
        pipeline.run(vec![valid_row("MEJORAMIENTO SEDE RURAL")]).unwrap();
        pipeline.run(vec![valid_row("mejoramiento sede rural ")]).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.project_count, 1);
        assert_eq!(stats.record_count, 2);
    }

    #[test]
    fn an_unparseable_date_fails_only_its_own_row() {
        let (pipeline, db) = pipeline();

        let mut rows = Vec::new();
        for i in 0..10 {
            let mut r = valid_row(&format!("PROYECTO {}", i));
            if i == 3 {
                // Data row 4, reported as row 5 after the header offset
                r.insert("FECHA SEGUIMIENTO".to_string(), json!(-42));
            }
            rows.push(r);
        }

        let report = pipeline.run(rows).unwrap();
        assert_eq!(report.processed, 9);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Row 5:"), "{}", report.errors[0]);
        assert_eq!(db.stats().unwrap().record_count, 9);
    }

    #[test]
    fn a_blank_row_is_skipped_without_an_error() {
        let (pipeline, _db) = pipeline();

        let rows = vec![
            valid_row("PROYECTO A"),
            row(&[("OBSERVACIONES", json!(""))]),
            Map::new(),
            valid_row("PROYECTO B"),
        ];

        let report = pipeline.run(rows).unwrap();
        assert_eq!(report.processed, 2);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn content_without_identifiers_is_a_row_error() {
        let (pipeline, _db) = pipeline();

        let rows = vec![row(&[
            ("MUNICIPIO", json!("NEIVA")),
            ("RESPONSABLE", json!("ALGUIEN")),
        ])];

        let report = pipeline.run(rows).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("missing identifiers"));
    }

    #[test]
    fn numeric_date_serials_convert_to_calendar_dates() {
        let (pipeline, db) = pipeline();

        let mut r = valid_row("PROYECTO FECHA");
        r.insert("FECHA SEGUIMIENTO".to_string(), json!(45292));
        pipeline.run(vec![r]).unwrap();

        let rows = db.with_conn(|conn| records::export_rows(conn)).unwrap();
        assert_eq!(rows[0].record_date, "1/1/2024");
    }

    #[test]
    fn institution_and_site_are_skipped_without_their_parent() {
        let (pipeline, db) = pipeline();

        let mut r = valid_row("PROYECTO SIN MUNICIPIO");
        r.remove("MUNICIPIO");
        let report = pipeline.run(vec![r]).unwrap();

        assert_eq!(report.processed, 1);
        let stats = db.stats().unwrap();
        assert_eq!(stats.municipality_count, 0);
        assert_eq!(stats.site_count, 0);

        let rows = db.with_conn(|conn| records::export_rows(conn)).unwrap();
        assert_eq!(rows[0].site, None);
    }

    #[test]
    fn unmatched_indicator_names_leave_the_reference_null() {
        let (pipeline, db) = pipeline();

        let mut r = valid_row("PROYECTO INDICADOR");
        r.insert("INDICADOR".to_string(), json!("NO EXISTE"));
        pipeline.run(vec![r]).unwrap();

        let rows = db.with_conn(|conn| records::export_rows(conn)).unwrap();
        assert_eq!(rows[0].indicator, None);
        // And nothing was created in the catalog
        assert_eq!(db.stats().unwrap().indicator_count, 0);
    }

    #[test]
    fn a_positive_addition_amount_sets_the_addition_fields() {
        let (pipeline, db) = pipeline();

        let mut r = valid_row("PROYECTO ADICIÓN");
        r.insert("VALOR ADICIÓN".to_string(), json!(750_000));
        r.insert("FUENTE ADICIÓN".to_string(), json!("regalías"));
        pipeline.run(vec![r]).unwrap();

        let rows = db.with_conn(|conn| records::export_rows(conn)).unwrap();
        assert!(rows[0].is_addition);
        assert_eq!(rows[0].addition_amount, 750_000.0);
        assert_eq!(rows[0].addition_source.as_deref(), Some("REGALÍAS"));
    }

    #[test]
    fn cofinancing_column_merges_into_men_with_its_label() {
        let (pipeline, db) = pipeline();

        let r = row(&[
            ("NOMBRE DEL PROYECTO", json!("PROYECTO COFINANCIADO")),
            ("VALOR MEN", json!(200_000)),
            ("VALOR COFINANCIACIÓN", json!(50_000)),
        ]);
        pipeline.run(vec![r]).unwrap();

        let project = db
            .with_conn(|conn| crate::db::projects::find_by_name_norm(conn, "PROYECTO COFINANCIADO"))
            .unwrap()
            .unwrap();
        assert_eq!(project.men_amount, 250_000.0);
        assert_eq!(project.total_amount, 250_000.0);
        assert_eq!(
            project.funding_sources.as_deref(),
            Some("MEN + COFINANCIACIÓN NACIONAL")
        );
    }

    #[test]
    fn unreadable_sources_are_fatal() {
        let missing = load_rows(Path::new("/nonexistent/rows.json"));
        assert!(matches!(missing, Err(TrackerError::SourceUnreadable(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        assert!(matches!(
            load_rows(&path),
            Err(TrackerError::SourceUnreadable(_))
        ));
    }
}
