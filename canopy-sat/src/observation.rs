use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single raw satellite reading for one forest parcel.
///
/// `vv_db` is the primary (co-polarised) radar channel and `vh_db` the
/// secondary (cross-polarised) channel, both in decibels. `red` and `nir`
/// are raw optical digital counts (Landsat B4 and B5) attached from the
/// optical table, if one matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub parcel: String,
    pub date: NaiveDate,
    pub vv_db: Option<f64>,
    pub vh_db: Option<f64>,
    pub red: Option<f64>,
    pub nir: Option<f64>,
    pub valid: bool,
}

/// A single optical reading: mean red and near-infrared digital counts.
///
/// `parcel` is `None` when the optical export covers the whole area
/// rather than a named parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticalObservation {
    pub parcel: Option<String>,
    pub date: NaiveDate,
    pub red: Option<f64>,
    pub nir: Option<f64>,
}

impl Observation {
    /// Create an observation with radar values only.
    pub fn radar(parcel: &str, date: NaiveDate, vv_db: Option<f64>, vh_db: Option<f64>) -> Self {
        Self {
            parcel: parcel.to_string(),
            date,
            vv_db,
            vh_db,
            red: None,
            nir: None,
            valid: true,
        }
    }

    /// Split observations into one sequence per parcel.
    ///
    /// Parcels appear in order of their first occurrence and each sequence
    /// keeps the original row order, so "last occurrence wins" rules can be
    /// applied downstream.
    pub fn partition_by_parcel(observations: Vec<Observation>) -> Vec<(String, Vec<Observation>)> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut result: Vec<(String, Vec<Observation>)> = Vec::new();
        for obs in observations {
            match index.get(&obs.parcel) {
                Some(&i) => result[i].1.push(obs),
                None => {
                    index.insert(obs.parcel.clone(), result.len());
                    result.push((obs.parcel.clone(), vec![obs]));
                }
            }
        }
        result
    }
}
