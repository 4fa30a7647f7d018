//! Project service - project identity resolution, funding aggregation
//! and activity resolution
//!
//! Project identity is resolved in a fixed order: exact code match
//! when a code is supplied, then an exact normalized-name match among
//! substring candidates, then creation. Substring search results are
//! candidates only and never treated as authoritative identity.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{activities, projects, records, ActivityRow, NewProjectRow, ProjectRow, TrackerDb};
use crate::error::TrackerError;
use crate::normalize::normalize;

/// Cap on substring-search results; candidates beyond this are not
/// worth surfacing to the form
const CANDIDATE_CAP: u32 = 10;

/// Sentinel source label when no funding component is active and no
/// manual label was supplied
pub const UNDEFINED_SOURCE: &str = "SIN DEFINIR";

/// The four independently tracked funding components
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FundingBreakdown {
    #[serde(default)]
    pub rp: f64,
    #[serde(default)]
    pub sgp: f64,
    #[serde(default)]
    pub men: f64,
    #[serde(default)]
    pub sgr: f64,
}

impl FundingBreakdown {
    pub fn sum(&self) -> f64 {
        self.rp + self.sgp + self.men + self.sgr
    }
}

/// Input for resolving or creating a project. `total_amount` and
/// `funding_sources` carry the already-resolved aggregation (see
/// [`ProjectService::resolve_funding`]).
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub code: Option<String>,
    pub name: String,
    pub contract_year: i64,
    pub contractor: Option<String>,
    pub funding: FundingBreakdown,
    pub total_amount: f64,
    pub funding_sources: String,
}

/// Project identity resolution and activity management
pub struct ProjectService {
    db: Arc<TrackerDb>,
}

impl ProjectService {
    pub fn new(db: Arc<TrackerDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Exact-code lookup. An absent or blank code always yields `None`;
    /// codes are optional and never matched when missing.
    pub fn find_by_code(&self, code: Option<&str>) -> Result<Option<ProjectRow>, TrackerError> {
        let code = match clean_code(code) {
            Some(c) => c,
            None => return Ok(None),
        };
        self.db.with_conn(|conn| projects::find_by_code(conn, &code))
    }

    /// Substring search over code OR name, capped at 10 rows.
    /// Candidates only - callers must still check exact normalized
    /// equality before treating one as a match.
    pub fn find_candidates(&self, query: &str) -> Result<Vec<ProjectRow>, TrackerError> {
        self.db
            .with_conn(|conn| projects::search_candidates(conn, query, CANDIDATE_CAP))
    }

    pub fn get(&self, id: i64) -> Result<Option<ProjectRow>, TrackerError> {
        self.db.with_conn(|conn| projects::get_project(conn, id))
    }

    // =========================================================================
    // Resolve-or-create
    // =========================================================================

    /// Resolve a project to an id, creating it when neither the code
    /// nor the exact normalized name matches an existing row.
    pub fn resolve_or_create(&self, input: &NewProject) -> Result<i64, TrackerError> {
        if let Some(existing) = self.find_by_code(input.code.as_deref())? {
            return Ok(existing.id);
        }

        let name_norm = normalize(&input.name);
        if name_norm.is_empty() {
            return Err(TrackerError::MissingIdentifier(
                "project name is required".to_string(),
            ));
        }

        let candidates = self.find_candidates(input.name.trim())?;
        if let Some(existing) = candidates
            .into_iter()
            .find(|p| normalize(&p.name) == name_norm)
        {
            return Ok(existing.id);
        }

        let row = NewProjectRow {
            code: clean_code(input.code.as_deref()),
            name: input.name.trim().to_uppercase(),
            name_norm: name_norm.clone(),
            contract_year: input.contract_year,
            contractor: input
                .contractor
                .as_deref()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty()),
            rp_amount: input.funding.rp,
            sgp_amount: input.funding.sgp,
            men_amount: input.funding.men,
            sgr_amount: input.funding.sgr,
            total_amount: input.total_amount,
            funding_sources: input.funding_sources.clone(),
        };

        self.db.with_conn_mut(|conn| {
            match projects::insert_project(conn, &row) {
                Ok(id) => {
                    debug!(name = %row.name, id, "Created project");
                    Ok(id)
                }
                // Lost a race to a concurrent insert of the same name
                // or code; the row that won is the identity.
                Err(TrackerError::Conflict(_)) => {
                    if let Some(p) = projects::find_by_name_norm(conn, &name_norm)? {
                        return Ok(p.id);
                    }
                    if let Some(ref code) = row.code {
                        if let Some(p) = projects::find_by_code(conn, code)? {
                            return Ok(p.id);
                        }
                    }
                    Err(TrackerError::Internal(format!(
                        "project '{}' missing after uniqueness conflict",
                        row.name
                    )))
                }
                Err(e) => Err(e),
            }
        })
    }

    // =========================================================================
    // Financial aggregation
    // =========================================================================

    /// Resolve the total amount and source label from the four funding
    /// components. When the component sum is positive the total is the
    /// sum and the label concatenates the labels of every positive
    /// component in fixed order; otherwise the manually supplied total
    /// and label apply, the label defaulting to `SIN DEFINIR`.
    pub fn resolve_funding(
        funding: &FundingBreakdown,
        manual_total: f64,
        manual_source: Option<&str>,
    ) -> (f64, String) {
        let sum = funding.sum();
        if sum > 0.0 {
            let mut sources = Vec::new();
            if funding.rp > 0.0 {
                sources.push("R.P.");
            }
            if funding.sgp > 0.0 {
                sources.push("S.G.P.");
            }
            if funding.men > 0.0 {
                sources.push("MEN");
            }
            if funding.sgr > 0.0 {
                sources.push("S.G.R.");
            }
            (sum, sources.join(" + "))
        } else {
            let label = manual_source
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| UNDEFINED_SOURCE.to_string());
            (manual_total, label)
        }
    }

    /// Funding resolution for the bulk path: a positive co-financing
    /// amount is merged additively into the MEN component and its
    /// label spliced into the source list between MEN and S.G.R.
    pub fn resolve_import_funding(
        mut funding: FundingBreakdown,
        cofinancing: f64,
    ) -> (FundingBreakdown, f64, String) {
        let mut sources = Vec::new();
        if funding.rp > 0.0 {
            sources.push("R.P.");
        }
        if funding.sgp > 0.0 {
            sources.push("S.G.P.");
        }
        if funding.men > 0.0 {
            sources.push("MEN");
        }
        if cofinancing > 0.0 {
            sources.push("COFINANCIACIÓN NACIONAL");
            funding.men += cofinancing;
        }
        if funding.sgr > 0.0 {
            sources.push("S.G.R.");
        }

        let label = if sources.is_empty() {
            UNDEFINED_SOURCE.to_string()
        } else {
            sources.join(" + ")
        };
        let total = funding.sum();
        (funding, total, label)
    }

    // =========================================================================
    // Activities
    // =========================================================================

    /// Resolve an activity within a project, creating it when no
    /// existing description matches the normalized input exactly
    pub fn resolve_activity(
        &self,
        project_id: i64,
        description: &str,
    ) -> Result<i64, TrackerError> {
        let norm = normalize(description);
        if norm.is_empty() {
            return Err(TrackerError::MissingIdentifier(
                "activity description is required".to_string(),
            ));
        }
        let display = description.trim().to_uppercase();

        self.db.with_conn_mut(|conn| {
            if let Some(id) = activities::find_by_description(conn, project_id, &norm)? {
                return Ok(id);
            }
            match activities::insert_activity(conn, project_id, &display, &norm) {
                Ok(id) => {
                    debug!(project_id, id, "Created activity");
                    Ok(id)
                }
                Err(TrackerError::Conflict(_)) => {
                    activities::find_by_description(conn, project_id, &norm)?.ok_or_else(|| {
                        TrackerError::Internal(format!(
                            "activity '{}' missing after uniqueness conflict",
                            display
                        ))
                    })
                }
                Err(e) => Err(e),
            }
        })
    }

    pub fn activities_of(&self, project_id: i64) -> Result<Vec<ActivityRow>, TrackerError> {
        self.db
            .with_conn(|conn| activities::list_for_project(conn, project_id))
    }

    /// Most recent tracking for an activity, used by the form to
    /// pre-fill location and responsible fields
    pub fn last_tracking_for_activity(
        &self,
        activity_id: i64,
    ) -> Result<Option<records::LastTracking>, TrackerError> {
        self.db
            .with_conn(|conn| records::last_tracking_for_activity(conn, activity_id))
    }
}

/// An empty or whitespace-only code is treated as absent, preserving
/// the optional-uniqueness invariant
fn clean_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}
