//! Shared utility functions for canopy crates.

/// Date utility functions
pub mod dates {
    use chrono::{Datelike, NaiveDate};

    /// Storage format for observation dates: "YYYY-MM-DD"
    pub const DATE_FORMAT: &str = "%Y-%m-%d";

    /// Format a NaiveDate as "YYYY-MM-DD"
    pub fn format_date(date: &NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }

    /// Parse a date string in "YYYY-MM-DD" format.
    ///
    /// Satellite exports often carry a time component
    /// ("2021-03-04T00:00:00" or "2021-03-04 00:00:00"); anything after the
    /// first ten characters is ignored.
    pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
        let s = s.trim();
        let day = s.get(..10).unwrap_or(s);
        Ok(NaiveDate::parse_from_str(day, DATE_FORMAT)?)
    }

    /// Calendar (year, month) for a date.
    pub fn year_month(date: &NaiveDate) -> (i32, u32) {
        (date.year(), date.month())
    }

}

/// Numeric field parsing for loosely formatted CSV exports
pub mod numbers {
    /// Parse a measurement field.
    ///
    /// Empty strings, `NaN` and unparseable text are missing (`None`).
    /// Infinite values (`inf`, `-inf`, `Infinity`) are returned as-is.
    pub fn parse_measurement(s: &str) -> Option<f64> {
        match s.trim().parse::<f64>() {
            Ok(v) if v.is_nan() => None,
            Ok(v) => Some(v),
            Err(_) => None,
        }
    }

    /// Parse a boolean-ish flag column (`1`, `0`, `true`, `false`, `yes`, `no`).
    ///
    /// Empty or unrecognised values fall back to `default`.
    pub fn parse_flag(s: &str, default: bool) -> bool {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "1.0" | "true" | "yes" | "y" => true,
            "0" | "0.0" | "false" | "no" | "n" => false,
            _ => default,
        }
    }

}
