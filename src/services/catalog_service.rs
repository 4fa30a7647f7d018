//! Catalog service - resolve-or-create over the location hierarchy
//!
//! Each resolver looks up by normalized name within its scope and
//! inserts only when nothing matches. A create that loses a race to a
//! concurrent insert of the same normalized name is recovered by
//! re-querying the scope; the conflict is never surfaced. This applies
//! uniformly to the interactive save path and the bulk import path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{catalog, CatalogRow, TrackerDb};
use crate::error::TrackerError;
use crate::normalize::normalize;

/// A location-level selection: either a known catalog id or a proposed
/// new name. Callers asserting novelty still go through the normalized
/// lookup, so a concurrent prior insert is reused rather than
/// duplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationRef {
    Existing(i64),
    New(String),
}

/// Resolve-or-create service for municipalities, institutions, sites
/// and the read-only indicator catalog
pub struct CatalogService {
    db: Arc<TrackerDb>,
}

impl CatalogService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Resolve-or-create
    // =========================================================================

    /// Resolve a municipality by name, creating it when absent
    pub fn resolve_municipality(&self, name: &str) -> Result<i64, TrackerError> {
        let norm = normalize(name);
        if norm.is_empty() {
            return Err(TrackerError::MissingIdentifier(
                "missing required location level: municipality".to_string(),
            ));
        }
        let display_name = display_form(name);

        self.db.with_conn_mut(|conn| {
            if let Some(id) = catalog::find_municipality(conn, &norm)? {
                return Ok(id);
            }
            match catalog::insert_municipality(conn, &display_name, &norm) {
                Ok(id) => {
                    debug!(name = %display_name, id, "Created municipality");
                    Ok(id)
                }
                Err(TrackerError::Conflict(_)) => catalog::find_municipality(conn, &norm)?
                    .ok_or_else(|| conflict_vanished("municipality", &norm)),
                Err(e) => Err(e),
            }
        })
    }

    /// Resolve an institution by name within a municipality
    pub fn resolve_institution(
        &self,
        name: &str,
        municipality_id: i64,
    ) -> Result<i64, TrackerError> {
        let norm = normalize(name);
        if norm.is_empty() {
            return Err(TrackerError::MissingIdentifier(
                "missing required location level: institution".to_string(),
            ));
        }
        let display_name = display_form(name);

        self.db.with_conn_mut(|conn| {
            if let Some(id) = catalog::find_institution(conn, &norm, municipality_id)? {
                return Ok(id);
            }
            match catalog::insert_institution(conn, &display_name, &norm, municipality_id) {
                Ok(id) => {
                    debug!(name = %display_name, municipality_id, id, "Created institution");
                    Ok(id)
                }
                Err(TrackerError::Conflict(_)) => {
                    catalog::find_institution(conn, &norm, municipality_id)?
                        .ok_or_else(|| conflict_vanished("institution", &norm))
                }
                Err(e) => Err(e),
            }
        })
    }

    /// Resolve a site by name within an institution
    pub fn resolve_site(&self, name: &str, institution_id: i64) -> Result<i64, TrackerError> {
        let norm = normalize(name);
        if norm.is_empty() {
            return Err(TrackerError::MissingIdentifier(
                "missing required location level: site".to_string(),
            ));
        }
        let display_name = display_form(name);

        self.db.with_conn_mut(|conn| {
            if let Some(id) = catalog::find_site(conn, &norm, institution_id)? {
                return Ok(id);
            }
            match catalog::insert_site(conn, &display_name, &norm, institution_id) {
                Ok(id) => {
                    debug!(name = %display_name, institution_id, id, "Created site");
                    Ok(id)
                }
                Err(TrackerError::Conflict(_)) => {
                    catalog::find_site(conn, &norm, institution_id)?
                        .ok_or_else(|| conflict_vanished("site", &norm))
                }
                Err(e) => Err(e),
            }
        })
    }

    // =========================================================================
    // Tagged selections from the interactive form
    // =========================================================================

    pub fn resolve_municipality_ref(&self, selection: &LocationRef) -> Result<i64, TrackerError> {
        match selection {
            LocationRef::Existing(id) => Ok(*id),
            LocationRef::New(name) => self.resolve_municipality(name),
        }
    }

    pub fn resolve_institution_ref(
        &self,
        selection: &LocationRef,
        municipality_id: i64,
    ) -> Result<i64, TrackerError> {
        match selection {
            LocationRef::Existing(id) => Ok(*id),
            LocationRef::New(name) => self.resolve_institution(name, municipality_id),
        }
    }

    pub fn resolve_site_ref(
        &self,
        selection: &LocationRef,
        institution_id: i64,
    ) -> Result<i64, TrackerError> {
        match selection {
            LocationRef::Existing(id) => Ok(*id),
            LocationRef::New(name) => self.resolve_site(name, institution_id),
        }
    }

    // =========================================================================
    // Indicators (lookup only, never created here)
    // =========================================================================

    pub fn resolve_indicator(&self, name: &str) -> Result<Option<i64>, TrackerError> {
        let norm = normalize(name);
        if norm.is_empty() {
            return Ok(None);
        }
        self.db.with_conn(|conn| catalog::find_indicator(conn, &norm))
    }

    // =========================================================================
    // Listings for the form collaborator
    // =========================================================================

    pub fn municipalities(&self) -> Result<Vec<CatalogRow>, TrackerError> {
        self.db.with_conn(catalog::list_municipalities)
    }

    pub fn institutions_of(&self, municipality_id: i64) -> Result<Vec<CatalogRow>, TrackerError> {
        self.db
            .with_conn(|conn| catalog::list_institutions(conn, municipality_id))
    }

    pub fn sites_of(&self, institution_id: i64) -> Result<Vec<CatalogRow>, TrackerError> {
        self.db
            .with_conn(|conn| catalog::list_sites(conn, institution_id))
    }

    pub fn indicators(&self) -> Result<Vec<CatalogRow>, TrackerError> {
        self.db.with_conn(catalog::list_indicators)
    }
}

/// Display form kept for catalog rows: trimmed and upper-cased, with
/// diacritics preserved
fn display_form(name: &str) -> String {
    name.trim().to_uppercase()
}

fn conflict_vanished(level: &str, norm: &str) -> TrackerError {
    TrackerError::Internal(format!(
        "{} '{}' missing after uniqueness conflict",
        level, norm
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(TrackerDb::open_in_memory().unwrap()))
    }

    #[test]
    fn same_name_resolves_to_same_id() {
        let svc = service();
        let a = svc.resolve_municipality("NEIVA").unwrap();
        let b = svc.resolve_municipality("NEIVA").unwrap();
        assert_eq!(a, b);
        assert_eq!(svc.municipalities().unwrap().len(), 1);
    }

    #[test]
    fn lookup_is_case_whitespace_and_diacritic_insensitive() {
        let svc = service();
        let a = svc.resolve_municipality("BOGOTÁ").unwrap();
        let b = svc.resolve_municipality("bogota ").unwrap();
        let c = svc.resolve_municipality("Bogotá").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(svc.municipalities().unwrap().len(), 1);
    }

    #[test]
    fn institution_uniqueness_is_scoped_to_municipality() {
        let svc = service();
        let mun_a = svc.resolve_municipality("NEIVA").unwrap();
        let mun_b = svc.resolve_municipality("PITALITO").unwrap();

        let inst_a = svc.resolve_institution("IE CENTRAL", mun_a).unwrap();
        let inst_b = svc.resolve_institution("IE CENTRAL", mun_b).unwrap();
        assert_ne!(inst_a, inst_b);

        // Same scope reuses
        let again = svc.resolve_institution("ie central", mun_a).unwrap();
        assert_eq!(inst_a, again);
    }

    #[test]
    fn site_uniqueness_is_scoped_to_institution() {
        let svc = service();
        let mun = svc.resolve_municipality("GARZÓN").unwrap();
        let inst_a = svc.resolve_institution("IE SIMÓN BOLÍVAR", mun).unwrap();
        let inst_b = svc.resolve_institution("IE LA MERCED", mun).unwrap();

        let site_a = svc.resolve_site("SEDE PRINCIPAL", inst_a).unwrap();
        let site_b = svc.resolve_site("SEDE PRINCIPAL", inst_b).unwrap();
        assert_ne!(site_a, site_b);
    }

    #[test]
    fn blank_name_is_a_missing_identifier() {
        let svc = service();
        let err = svc.resolve_municipality("   ").unwrap_err();
        assert!(matches!(err, TrackerError::MissingIdentifier(_)));

        // No empty-named row was created
        assert!(svc.municipalities().unwrap().is_empty());
    }

    #[test]
    fn asserted_new_selection_reuses_existing_row() {
        let svc = service();
        let existing = svc.resolve_municipality("RIVERA").unwrap();

        let resolved = svc
            .resolve_municipality_ref(&LocationRef::New("rivera ".to_string()))
            .unwrap();
        assert_eq!(existing, resolved);
    }

    #[test]
    fn a_lost_insert_race_surfaces_as_a_recoverable_conflict() {
        let db = Arc::new(TrackerDb::open_in_memory().unwrap());

        // A concurrent writer already inserted the normalized name
        db.with_conn(|conn| catalog::insert_municipality(conn, "NEIVA", "NEIVA"))
            .unwrap();
        let err = db
            .with_conn(|conn| catalog::insert_municipality(conn, "neiva", "NEIVA"))
            .unwrap_err();
        assert!(matches!(err, TrackerError::Conflict(_)));

        // The resolver recovers by re-querying the scope
        let svc = CatalogService::new(Arc::clone(&db));
        let id = svc.resolve_municipality("Neiva").unwrap();
        assert_eq!(svc.municipalities().unwrap().len(), 1);
        assert!(id > 0);
    }

    #[test]
    fn indicator_resolution_never_creates() {
        let svc = service();
        assert_eq!(svc.resolve_indicator("AULAS CONSTRUIDAS").unwrap(), None);
        assert!(svc.indicators().unwrap().is_empty());
    }
}
