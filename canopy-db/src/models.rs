//! Query result model structs.
//!
//! All structs derive `Serialize`; choosing a wire format is left to
//! whatever layer sits in front of the queries.

use canopy_data::DerivedRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Filtered derived rows, sorted by date ascending (ties by parcel).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryResult {
    pub records: Vec<DerivedRecord>,
    /// Sum of the alert flag over `records`.
    pub alert_count: i64,
    /// Number of rows in `records`.
    pub total_record_count: usize,
}

/// One monthly summary row.
///
/// `parcel` is set only for per-parcel comparisons. `alert_sum` is absent
/// for tables without an alert column (the optical-only trend).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregateBucket {
    pub year: i32,
    pub month: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parcel: Option<String>,
    /// Mean of each requested index column, keyed by column name.
    pub means: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_sum: Option<i64>,
    /// Number of records in the bucket.
    pub count: i64,
}

/// Alert-normalised health of a parcel selection.
///
/// `health = 100 - alert_count / total_alerts_overall * 100`, floored at 0,
/// where the denominator ignores the parcel filter. No alerts anywhere in
/// scope is a perfect 100.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct HealthScore {
    pub health: f64,
    pub alert_count: i64,
    pub total_alerts_overall: i64,
}

impl HealthScore {
    pub fn from_counts(alert_count: i64, total_alerts_overall: i64) -> Self {
        if total_alerts_overall == 0 {
            return Self {
                health: 100.0,
                alert_count: 0,
                total_alerts_overall: 0,
            };
        }
        let share = alert_count as f64 / total_alerts_overall as f64;
        Self {
            health: (100.0 - share * 100.0).clamp(0.0, 100.0),
            alert_count,
            total_alerts_overall,
        }
    }
}

/// A (year, value) pair for yearly series.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct YearValue {
    pub year: i32,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_without_alerts_is_perfect() {
        let h = HealthScore::from_counts(0, 0);
        assert_eq!(h.health, 100.0);
        assert_eq!(h.alert_count, 0);
    }

    #[test]
    fn health_is_share_of_overall_alerts() {
        let h = HealthScore::from_counts(1, 4);
        assert_eq!(h.health, 75.0);
        let h = HealthScore::from_counts(4, 4);
        assert_eq!(h.health, 0.0);
    }

    #[test]
    fn single_series_bucket_omits_parcel() {
        let bucket = AggregateBucket {
            year: 2021,
            month: 3,
            parcel: None,
            means: BTreeMap::from([("rfdi".to_string(), 0.5)]),
            alert_sum: None,
            count: 4,
        };
        let json = serde_json::to_value(&bucket).unwrap();
        assert!(json.get("parcel").is_none());
        assert!(json.get("alert_sum").is_none());
        assert_eq!(json["means"]["rfdi"], 0.5);

        let per_parcel = AggregateBucket {
            parcel: Some("Kibwezi".to_string()),
            alert_sum: Some(2),
            ..bucket
        };
        let json = serde_json::to_value(&per_parcel).unwrap();
        assert_eq!(json["parcel"], "Kibwezi");
        assert_eq!(json["alert_sum"], 2);
    }

    #[test]
    fn health_never_goes_negative() {
        let h = HealthScore::from_counts(9, 4);
        assert_eq!(h.health, 0.0);
    }
}
