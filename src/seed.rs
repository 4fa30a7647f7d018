//! First-run seeding of the reference catalogs
//!
//! Populates the indicator catalog and the location hierarchy from the
//! bundled reference tables, once per store lifetime. The gate is an
//! explicit store query (indicator catalog non-empty → no-op), so
//! seeding stays idempotent across restarts and repeated
//! initialization. Each reference load runs inside one transaction and
//! rolls back entirely on failure.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::params;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::db::{catalog, TrackerDb};
use crate::error::TrackerError;
use crate::normalize::{normalize, normalize_row};

/// Bundled reference tables, one JSON array of row objects each
const INDICATORS_SOURCE: &str = include_str!("../data/indicators.json");
const LOCATIONS_SOURCE: &str = include_str!("../data/locations.json");

// Accepted header spellings per logical field, tried in order before
// falling back to the first available column
const INDICATOR_ALIASES: &[&str] = &["INDICADOR", "NOMBRE"];
const MUNICIPALITY_ALIASES: &[&str] = &["MUNICIPIO", "MPIO"];
const INSTITUTION_ALIASES: &[&str] = &["INSTITUCION", "INSTITUCIONEDUCATIVA"];
const SITE_ALIASES: &[&str] = &["SEDE", "SEDEEDUCATIVA"];

/// Outcome of one seeding attempt
#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    /// True when the catalogs were already populated and nothing ran
    pub skipped: bool,
    pub indicators_inserted: usize,
    pub municipalities_inserted: usize,
    pub institutions_inserted: usize,
    pub sites_inserted: usize,
}

/// One-time idempotent bootstrap of the reference catalogs
pub struct SeedLoader {
    db: Arc<TrackerDb>,
}

impl SeedLoader {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    /// Seed the catalogs unless the indicator catalog already has rows
    pub fn run(&self) -> Result<SeedReport, TrackerError> {
        let existing = self.db.with_conn(catalog::indicator_count)?;
        if existing > 0 {
            debug!(existing, "Indicator catalog already populated, skipping seed");
            return Ok(SeedReport {
                skipped: true,
                ..Default::default()
            });
        }

        let indicator_rows = parse_reference_rows("indicators", INDICATORS_SOURCE)?;
        let location_rows = parse_reference_rows("locations", LOCATIONS_SOURCE)?;

        let mut report = SeedReport::default();
        report.indicators_inserted = self.load_indicators(&indicator_rows)?;
        let (municipalities, institutions, sites) = self.load_locations(&location_rows)?;
        report.municipalities_inserted = municipalities;
        report.institutions_inserted = institutions;
        report.sites_inserted = sites;

        info!(
            indicators = report.indicators_inserted,
            municipalities = report.municipalities_inserted,
            institutions = report.institutions_inserted,
            sites = report.sites_inserted,
            "Seeded reference catalogs"
        );

        Ok(report)
    }

    /// Load the flat indicator table inside one transaction
    fn load_indicators(&self, rows: &[Map<String, Value>]) -> Result<usize, TrackerError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| TrackerError::Internal(format!("Transaction failed: {}", e)))?;

            let mut inserted = 0usize;
            for raw_row in rows {
                let row = normalize_row(raw_row);
                let Some(name) = reference_field(&row, INDICATOR_ALIASES) else {
                    continue;
                };
                let norm = normalize(&name);
                if norm.is_empty() {
                    continue;
                }

                let changes = tx
                    .execute(
                        "INSERT OR IGNORE INTO indicators (name, name_norm) VALUES (?, ?)",
                        params![name.trim().to_uppercase(), norm],
                    )
                    .map_err(|e| TrackerError::Internal(format!("Indicator insert failed: {}", e)))?;
                inserted += changes;
            }

            tx.commit()
                .map_err(|e| TrackerError::Internal(format!("Commit failed: {}", e)))?;

            Ok(inserted)
        })
    }

    /// Load the municipality/institution/site hierarchy inside one
    /// transaction: municipalities first (deduplicated in memory),
    /// then institutions under their municipality, then sites under
    /// their (institution, municipality) pair.
    fn load_locations(
        &self,
        rows: &[Map<String, Value>],
    ) -> Result<(usize, usize, usize), TrackerError> {
        let rows: Vec<Map<String, Value>> = rows.iter().map(normalize_row).collect();

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| TrackerError::Internal(format!("Transaction failed: {}", e)))?;

            // Municipalities, keyed by normalized name
            let mut municipality_ids: HashMap<String, i64> = HashMap::new();
            let mut municipalities = 0usize;
            for row in &rows {
                let Some(name) = reference_field(row, MUNICIPALITY_ALIASES) else {
                    continue;
                };
                let norm = normalize(&name);
                if norm.is_empty() || municipality_ids.contains_key(&norm) {
                    continue;
                }
                let id = match catalog::find_municipality(&tx, &norm)? {
                    Some(id) => id,
                    None => {
                        municipalities += 1;
                        catalog::insert_municipality(&tx, &name.trim().to_uppercase(), &norm)?
                    }
                };
                municipality_ids.insert(norm, id);
            }

            // Institutions, keyed by (municipality, institution)
            let mut institution_ids: HashMap<(i64, String), i64> = HashMap::new();
            let mut institutions = 0usize;
            for row in &rows {
                let (Some(mun), Some(inst)) = (
                    reference_field(row, MUNICIPALITY_ALIASES),
                    reference_field(row, INSTITUTION_ALIASES),
                ) else {
                    continue;
                };
                let Some(&municipality_id) = municipality_ids.get(&normalize(&mun)) else {
                    continue;
                };
                let norm = normalize(&inst);
                if norm.is_empty() || institution_ids.contains_key(&(municipality_id, norm.clone()))
                {
                    continue;
                }
                let id = match catalog::find_institution(&tx, &norm, municipality_id)? {
                    Some(id) => id,
                    None => {
                        institutions += 1;
                        catalog::insert_institution(
                            &tx,
                            &inst.trim().to_uppercase(),
                            &norm,
                            municipality_id,
                        )?
                    }
                };
                institution_ids.insert((municipality_id, norm), id);
            }

            // Sites under their (institution, municipality) pair
            let mut sites = 0usize;
            for row in &rows {
                let (Some(mun), Some(inst), Some(site)) = (
                    reference_field(row, MUNICIPALITY_ALIASES),
                    reference_field(row, INSTITUTION_ALIASES),
                    reference_field(row, SITE_ALIASES),
                ) else {
                    continue;
                };
                let Some(&municipality_id) = municipality_ids.get(&normalize(&mun)) else {
                    continue;
                };
                let Some(&institution_id) =
                    institution_ids.get(&(municipality_id, normalize(&inst)))
                else {
                    continue;
                };
                let norm = normalize(&site);
                if norm.is_empty() {
                    continue;
                }
                if catalog::find_site(&tx, &norm, institution_id)?.is_none() {
                    catalog::insert_site(&tx, &site.trim().to_uppercase(), &norm, institution_id)?;
                    sites += 1;
                }
            }

            tx.commit()
                .map_err(|e| TrackerError::Internal(format!("Commit failed: {}", e)))?;

            Ok((municipalities, institutions, sites))
        })
    }
}

/// Parse one bundled reference table
fn parse_reference_rows(
    label: &str,
    source: &str,
) -> Result<Vec<Map<String, Value>>, TrackerError> {
    let value: Value = serde_json::from_str(source)
        .map_err(|e| TrackerError::Parse(format!("{} reference table: {}", label, e)))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(TrackerError::Parse(format!(
                    "{} reference table: expected a row object, got {}",
                    label, other
                ))),
            })
            .collect(),
        _ => Err(TrackerError::Parse(format!(
            "{} reference table: expected an array of rows",
            label
        ))),
    }
}

/// Value of the first matching alias, falling back to the row's first
/// available column
fn reference_field(row: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    let cell = aliases
        .iter()
        .find_map(|alias| row.get(*alias))
        .or_else(|| row.values().next());

    match cell {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
