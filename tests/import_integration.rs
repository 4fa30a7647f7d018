//! Integration tests for the seeding + ingestion + save flow
//!
//! These exercise the full chain against an on-disk store: first-run
//! seeding, a bulk import whose rows resolve against the seeded
//! catalogs, and the interactive save path reusing what the import
//! created.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use obra_tracker::db::records::export_rows;
use obra_tracker::services::{LocationEntry, LocationRef, SaveRequest, TrackingService};
use obra_tracker::{ImportPipeline, SeedLoader, TrackerDb};

/// Helper to open a store in a temporary directory
fn open_store() -> (Arc<TrackerDb>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(TrackerDb::open(temp_dir.path()).unwrap());
    (db, temp_dir)
}

fn import_row(name: &str, municipality: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut row = serde_json::Map::new();
    row.insert("CÓDIGO BPIN".to_string(), json!(""));
    row.insert("NOMBRE DEL PROYECTO".to_string(), json!(name));
    row.insert("AÑO CONTRATO".to_string(), json!(2025));
    row.insert("CONTRATISTA".to_string(), json!("CONSORCIO EDUCATIVO"));
    row.insert("ACTIVIDADES A CONTRATAR".to_string(), json!("OBRA CIVIL"));
    row.insert("VALOR R.P.".to_string(), json!(800_000));
    row.insert("MUNICIPIO".to_string(), json!(municipality));
    row.insert("INSTITUCIÓN".to_string(), json!("IE DEPARTAMENTAL"));
    row.insert("SEDE".to_string(), json!("SEDE PRINCIPAL"));
    row.insert("INDICADOR".to_string(), json!("Aulas Construidas"));
    row.insert("FECHA SEGUIMIENTO".to_string(), json!("20/6/2025"));
    row.insert("% AVANCE FÍSICO".to_string(), json!(55));
    row.insert("RESPONSABLE".to_string(), json!("SUPERVISOR"));
    row
}

#[test]
fn seed_import_and_save_share_one_catalog() {
    let (db, _temp) = open_store();

    // First-run seeding populates the catalogs
    let seed = SeedLoader::new(Arc::clone(&db)).run().unwrap();
    assert!(!seed.skipped);
    let seeded = db.stats().unwrap();

    // Import resolves against the seeded hierarchy: NEIVA and its
    // IE DEPARTAMENTAL / SEDE PRINCIPAL already exist
    let pipeline = ImportPipeline::new(Arc::clone(&db));
    let report = pipeline
        .run(vec![import_row("CONSTRUCCIÓN DE AULAS NEIVA", "neiva ")])
        .unwrap();
    assert_eq!(report.processed, 1);
    assert!(report.errors.is_empty());

    let after_import = db.stats().unwrap();
    assert_eq!(after_import.municipality_count, seeded.municipality_count);
    assert_eq!(after_import.site_count, seeded.site_count);
    assert_eq!(after_import.project_count, 1);

    // The seeded indicator matched by normalized name
    let rows = db.with_conn(|conn| export_rows(conn)).unwrap();
    assert_eq!(rows[0].indicator.as_deref(), Some("AULAS CONSTRUIDAS"));
    assert_eq!(rows[0].municipality.as_deref(), Some("NEIVA"));

    // The interactive save reuses the imported project by exact
    // normalized name and the seeded location rows
    let tracking = TrackingService::new(Arc::clone(&db));
    let outcome = tracking
        .save(&SaveRequest {
            project_name: Some("construcción de aulas neiva".to_string()),
            contract_year: 2025,
            new_activity_description: Some("obra civil".to_string()),
            record_date: Some("21/6/2025".to_string()),
            responsible: Some("SUPERVISOR".to_string()),
            locations: vec![LocationEntry {
                municipality: LocationRef::New("NEIVA".to_string()),
                institution: LocationRef::New("IE DEPARTAMENTAL".to_string()),
                site: LocationRef::New("SEDE PRINCIPAL".to_string()),
                percent_complete: 60.0,
                notes: None,
            }],
            ..Default::default()
        })
        .unwrap();
    assert_eq!(outcome.records_saved, 1);

    let final_stats = db.stats().unwrap();
    assert_eq!(final_stats.project_count, 1);
    assert_eq!(final_stats.municipality_count, seeded.municipality_count);
    assert_eq!(final_stats.site_count, seeded.site_count);
    assert_eq!(final_stats.record_count, 2);
}

#[test]
fn reseeding_an_existing_store_inserts_nothing() {
    let (db, _temp) = open_store();

    SeedLoader::new(Arc::clone(&db)).run().unwrap();
    let before = db.stats().unwrap();

    let second = SeedLoader::new(Arc::clone(&db)).run().unwrap();
    assert!(second.skipped);
    assert_eq!(second.indicators_inserted, 0);
    assert_eq!(second.municipalities_inserted, 0);

    let after = db.stats().unwrap();
    assert_eq!(before.indicator_count, after.indicator_count);
    assert_eq!(before.municipality_count, after.municipality_count);
    assert_eq!(before.site_count, after.site_count);
}

#[test]
fn import_from_file_round_trips_through_the_export() {
    let (db, temp) = open_store();

    let rows = vec![
        import_row("DOTACIÓN MOBILIARIO PITALITO", "PITALITO"),
        import_row("MEJORAMIENTO CUBIERTA GARZÓN", "GARZÓN"),
    ];
    let path = temp.path().join("rows.json");
    std::fs::write(&path, serde_json::to_string(&rows).unwrap()).unwrap();

    let pipeline = ImportPipeline::new(Arc::clone(&db));
    let report = pipeline.import_file(&path).unwrap();
    assert_eq!(report.processed, 2);
    assert!(report.errors.is_empty());

    let exported = db.with_conn(|conn| export_rows(conn)).unwrap();
    assert_eq!(exported.len(), 2);

    // Newest record first
    assert_eq!(
        exported[0].project_name.as_str(),
        "MEJORAMIENTO CUBIERTA GARZÓN"
    );
    assert_eq!(exported[0].activity.as_deref(), Some("OBRA CIVIL"));
    assert_eq!(exported[0].funding_sources.as_deref(), Some("R.P."));
    assert_eq!(exported[0].total_amount, 800_000.0);
    assert_eq!(exported[0].record_date, "20/6/2025");
}

#[test]
fn a_failing_row_does_not_abort_the_batch_across_the_file_path() {
    let (db, temp) = open_store();

    let mut bad = import_row("PROYECTO CON FECHA ROTA", "RIVERA");
    bad.insert("FECHA SEGUIMIENTO".to_string(), json!(-1));

    let rows = vec![
        import_row("PROYECTO BUENO UNO", "RIVERA"),
        bad,
        import_row("PROYECTO BUENO DOS", "RIVERA"),
    ];
    let path = temp.path().join("rows.json");
    std::fs::write(&path, serde_json::to_string(&rows).unwrap()).unwrap();

    let report = ImportPipeline::new(Arc::clone(&db))
        .import_file(&path)
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Row 3:"));
}
