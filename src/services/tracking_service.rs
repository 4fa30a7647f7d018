//! Tracking service - the single-record save path behind the
//! interactive form
//!
//! One save request carries the project identity, one activity, and a
//! list of location entries; a progress record is inserted per entry.
//! Validation failures are rejected before any write. Catalog rows
//! committed by resolver calls before a later failure are acceptable:
//! normalized lookup dedupes them on retry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dates;
use crate::db::{records, NewRecord, TrackerDb};
use crate::error::TrackerError;

use super::catalog_service::{CatalogService, LocationRef};
use super::project_service::{FundingBreakdown, NewProject, ProjectService};

/// One site entry of a save request
#[derive(Debug, Clone, Deserialize)]
pub struct LocationEntry {
    pub municipality: LocationRef,
    pub institution: LocationRef,
    pub site: LocationRef,
    #[serde(default)]
    pub percent_complete: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for the single-record save path
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveRequest {
    /// Existing project id; when absent the project is resolved from
    /// the identity fields below
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub contract_year: i64,
    #[serde(default)]
    pub contractor: Option<String>,
    #[serde(default)]
    pub funding: FundingBreakdown,
    #[serde(default)]
    pub manual_total: f64,
    #[serde(default)]
    pub manual_source: Option<String>,

    /// Existing activity id; when absent a description is required
    #[serde(default)]
    pub activity_id: Option<i64>,
    #[serde(default)]
    pub new_activity_description: Option<String>,

    #[serde(default)]
    pub indicator_id: Option<i64>,
    #[serde(default)]
    pub record_date: Option<String>,
    #[serde(default)]
    pub responsible: Option<String>,
    #[serde(default)]
    pub is_addition: bool,
    #[serde(default)]
    pub addition_amount: f64,
    #[serde(default)]
    pub addition_source: Option<String>,

    #[serde(default)]
    pub locations: Vec<LocationEntry>,
}

/// Result of a successful save
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub records_saved: usize,
    pub message: String,
}

/// Orchestrates the resolvers for one interactive save
pub struct TrackingService {
    db: Arc<TrackerDb>,
    catalog: CatalogService,
    projects: ProjectService,
}

impl TrackingService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self {
            catalog: CatalogService::new(Arc::clone(&db)),
            projects: ProjectService::new(Arc::clone(&db)),
            db,
        }
    }

    /// Save one progress entry per location. The whole request is
    /// rejected on the first failing step.
    pub fn save(&self, request: &SaveRequest) -> Result<SaveOutcome, TrackerError> {
        if request.locations.is_empty() {
            return Err(TrackerError::Validation(
                "at least one site entry is required".to_string(),
            ));
        }

        // 1. Project
        let project_id = match request.project_id {
            Some(id) => id,
            None => {
                let (total, sources) = ProjectService::resolve_funding(
                    &request.funding,
                    request.manual_total,
                    request.manual_source.as_deref(),
                );
                self.projects.resolve_or_create(&NewProject {
                    code: request.code.clone(),
                    name: request.project_name.clone().unwrap_or_default(),
                    contract_year: request.contract_year,
                    contractor: request.contractor.clone(),
                    funding: request.funding,
                    total_amount: total,
                    funding_sources: sources,
                })?
            }
        };

        // 2. Activity
        let activity_id = match request.activity_id {
            Some(id) => id,
            None => {
                let description = request.new_activity_description.as_deref().unwrap_or("");
                self.projects.resolve_activity(project_id, description)?
            }
        };

        let record_date = request
            .record_date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(dates::today_dmy);

        // 3. Locations, one record each
        let mut records_saved = 0;
        for entry in &request.locations {
            let municipality_id = self.catalog.resolve_municipality_ref(&entry.municipality)?;
            let institution_id = self
                .catalog
                .resolve_institution_ref(&entry.institution, municipality_id)?;
            let site_id = self.catalog.resolve_site_ref(&entry.site, institution_id)?;

            let record = NewRecord {
                project_id,
                activity_id: Some(activity_id),
                site_id: Some(site_id),
                indicator_id: request.indicator_id,
                percent_complete: entry.percent_complete,
                record_date: record_date.clone(),
                responsible: request.responsible.clone(),
                notes: entry.notes.clone(),
                is_addition: request.is_addition,
                addition_amount: request.addition_amount,
                addition_source: request.addition_source.clone(),
            };
            self.db.with_conn(|conn| records::insert_record(conn, &record))?;
            records_saved += 1;
        }

        info!(project_id, activity_id, records_saved, "Saved progress entries");

        Ok(SaveOutcome {
            records_saved,
            message: format!("Saved progress for {} site(s)", records_saved),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::export_rows;

    fn service() -> (TrackingService, Arc<TrackerDb>) {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());
        (TrackingService::new(Arc::clone(&db)), db)
    }

    fn base_request() -> SaveRequest {
        SaveRequest {
            project_name: Some("CONSTRUCCIÓN COMEDOR ESCOLAR".to_string()),
            contract_year: 2025,
            new_activity_description: Some("OBRA CIVIL".to_string()),
            record_date: Some("15/3/2025".to_string()),
            responsible: Some("Interventoría".to_string()),
            locations: vec![LocationEntry {
                municipality: LocationRef::New("NEIVA".to_string()),
                institution: LocationRef::New("IE DEPARTAMENTAL".to_string()),
                site: LocationRef::New("SEDE PRINCIPAL".to_string()),
                percent_complete: 40.0,
                notes: Some("avance normal".to_string()),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn save_resolves_the_full_chain_and_inserts_one_record_per_location() {
        let (svc, db) = service();
        let mut request = base_request();
        request.locations.push(LocationEntry {
            municipality: LocationRef::New("NEIVA".to_string()),
            institution: LocationRef::New("IE DEPARTAMENTAL".to_string()),
            site: LocationRef::New("SEDE NORTE".to_string()),
            percent_complete: 10.0,
            notes: None,
        });

        let outcome = svc.save(&request).unwrap();
        assert_eq!(outcome.records_saved, 2);

        let stats = db.stats().unwrap();
        assert_eq!(stats.project_count, 1);
        assert_eq!(stats.municipality_count, 1);
        assert_eq!(stats.site_count, 2);
        assert_eq!(stats.record_count, 2);

        let rows = db.with_conn(|conn| export_rows(conn)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].municipality.as_deref(), Some("NEIVA"));
        assert_eq!(rows[0].responsible.as_deref(), Some("INTERVENTORÍA"));
    }

    #[test]
    fn empty_location_list_is_rejected_before_any_write() {
        let (svc, db) = service();
        let mut request = base_request();
        request.locations.clear();

        let err = svc.save(&request).unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        assert_eq!(db.stats().unwrap().project_count, 0);
    }

    #[test]
    fn missing_activity_description_without_id_fails_the_save() {
        let (svc, db) = service();
        let mut request = base_request();
        request.new_activity_description = None;

        let err = svc.save(&request).unwrap_err();
        assert!(matches!(err, TrackerError::MissingIdentifier(_)));
        assert_eq!(db.stats().unwrap().record_count, 0);
    }

    #[test]
    fn repeated_save_reuses_project_and_catalog_rows() {
        let (svc, db) = service();
        svc.save(&base_request()).unwrap();
        svc.save(&base_request()).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.project_count, 1);
        assert_eq!(stats.municipality_count, 1);
        assert_eq!(stats.site_count, 1);
        assert_eq!(stats.record_count, 2);
    }
}
