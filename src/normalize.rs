//! Canonicalization of free-text names and spreadsheet column headers
//!
//! Every uniqueness comparison and catalog lookup in this crate goes
//! through [`normalize`]; raw strings are never compared directly.
//! Header matching additionally strips embedded whitespace so that a
//! column labeled "NOMBRE DEL PROYECTO" or "Año Contrato" still maps
//! to its canonical key.

use serde_json::{Map, Value};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical form of a name: trimmed, upper-cased, diacritics stripped.
///
/// Empty or whitespace-only input yields the empty string.
pub fn normalize(text: &str) -> String {
    text.trim()
        .to_uppercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Canonical form of a column header: all whitespace removed,
/// upper-cased, diacritics stripped.
pub fn normalize_header(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect()
}

/// Rewrite every key of a tabular row with [`normalize_header`],
/// preserving the original values. Later duplicate keys overwrite
/// earlier ones.
pub fn normalize_row(row: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in row {
        out.insert(normalize_header(key), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_strips_case_whitespace_and_diacritics() {
        assert_eq!(normalize("BOGOTÁ"), "BOGOTA");
        assert_eq!(normalize("bogota "), "BOGOTA");
        assert_eq!(normalize("Bogotá"), "BOGOTA");
        assert_eq!(normalize("  Garzón"), "GARZON");
        assert_eq!(normalize("Timaná"), "TIMANA");
        assert_eq!(normalize("ñame"), "NAME");
    }

    #[test]
    fn normalize_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn header_normalization_removes_embedded_whitespace() {
        assert_eq!(normalize_header("NOMBRE DEL PROYECTO"), "NOMBREDELPROYECTO");
        assert_eq!(normalize_header("Año Contrato"), "ANOCONTRATO");
        assert_eq!(normalize_header("VALOR R.P."), "VALORR.P.");
        assert_eq!(normalize_header("% Avance Físico"), "%AVANCEFISICO");
    }

    #[test]
    fn row_keys_are_rewritten_and_values_kept() {
        let mut row = Map::new();
        row.insert("Código BPIN".to_string(), json!("2024-001"));
        row.insert("MUNICIPIO".to_string(), json!("NEIVA"));

        let normalized = normalize_row(&row);
        assert_eq!(normalized.get("CODIGOBPIN"), Some(&json!("2024-001")));
        assert_eq!(normalized.get("MUNICIPIO"), Some(&json!("NEIVA")));
    }
}
