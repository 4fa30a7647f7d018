//! Record-date helpers
//!
//! Record dates are stored as D/M/YYYY text without zero padding,
//! matching the historical workbook format. Spreadsheet cells may
//! instead carry the numeric date serial of the 1900 date system;
//! those are converted on ingestion.

use chrono::{Datelike, Duration, Local, NaiveDate};

/// Highest serial we accept (31/12/9999 in the 1900 date system).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Today's date as D/M/YYYY text.
pub fn today_dmy() -> String {
    format_dmy(Local::now().date_naive())
}

/// Convert a spreadsheet numeric date serial to D/M/YYYY text.
///
/// Serial day 1 is 1/1/1900; the fractional time part is discarded.
/// Returns `None` for serials outside the representable range.
pub fn from_excel_serial(serial: f64) -> Option<String> {
    if !serial.is_finite() || serial <= 0.0 || serial > MAX_SERIAL {
        return None;
    }
    // Day 60 of the 1900 system is the phantom leap day; anchoring on
    // 1899-12-30 reproduces the system's mapping for modern dates.
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = base.checked_add_signed(Duration::days(serial.trunc() as i64))?;
    Some(format_dmy(date))
}

/// Chronological sort key for D/M/YYYY text dates. Unparseable dates
/// sort before everything else.
pub fn sort_key(date_text: &str) -> (i32, u32, u32) {
    let mut parts = date_text.trim().split('/');
    let day = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    let month = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    let year = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);
    (year, month, day)
}

fn format_dmy(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_conversion_matches_the_1900_system() {
        // 45292 is 1/1/2024
        assert_eq!(from_excel_serial(45292.0), Some("1/1/2024".to_string()));
        // Time-of-day fraction is discarded
        assert_eq!(from_excel_serial(45292.75), Some("1/1/2024".to_string()));
    }

    #[test]
    fn invalid_serials_are_rejected() {
        assert_eq!(from_excel_serial(0.0), None);
        assert_eq!(from_excel_serial(-5.0), None);
        assert_eq!(from_excel_serial(f64::NAN), None);
        assert_eq!(from_excel_serial(4_000_000.0), None);
    }

    #[test]
    fn sort_keys_order_text_dates_chronologically() {
        assert!(sort_key("9/1/2024") < sort_key("10/1/2024"));
        assert!(sort_key("31/12/2023") < sort_key("1/1/2024"));
        assert!(sort_key("not a date") < sort_key("1/1/1900"));
    }
}
