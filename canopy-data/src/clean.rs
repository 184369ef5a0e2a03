//! Per-parcel de-duplication and gap filling.
//!
//! Observations are partitioned by parcel first; every parcel's sequence is
//! sorted, de-duplicated and interpolated on its own and the results are
//! concatenated. No interpolation ever sees a sample from another parcel.

use crate::interpolation::{fill_both_directions, DataPoint};
use canopy_sat::Observation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

/// An observation after per-parcel cleaning.
///
/// `vv_db` holds the gap-filled primary channel; `filled` is true when that
/// value was produced by interpolation rather than read from the source.
/// The secondary channel and optical bands pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedObservation {
    pub parcel: String,
    pub date: NaiveDate,
    pub vv_db: Option<f64>,
    pub vh_db: Option<f64>,
    pub red: Option<f64>,
    pub nir: Option<f64>,
    pub valid: bool,
    pub filled: bool,
}

/// Clean an unordered collection of observations.
///
/// Per parcel: rows are sorted by date, exact-date duplicates collapse to the
/// last row seen, and the primary channel is interpolated across gaps
/// (leading and trailing gaps take the nearest known value). Parcels are
/// emitted in order of first appearance.
pub fn clean(observations: Vec<Observation>) -> Vec<CleanedObservation> {
    let input_len = observations.len();
    let parcels = Observation::partition_by_parcel(observations);
    let parcel_count = parcels.len();

    let cleaned: Vec<CleanedObservation> = parcels
        .into_iter()
        .flat_map(|(_, rows)| clean_parcel(rows))
        .collect();

    log::info!(
        "clean: {} observations across {} parcels cleaned to {} rows",
        input_len,
        parcel_count,
        cleaned.len()
    );
    cleaned
}

/// Clean one parcel's rows (all rows must share the same parcel id).
pub fn clean_parcel(rows: Vec<Observation>) -> Vec<CleanedObservation> {
    // Later inserts overwrite earlier ones: last occurrence wins.
    let mut by_date: BTreeMap<NaiveDate, Observation> = BTreeMap::new();
    for row in rows {
        by_date.insert(row.date, row);
    }
    let sorted: Vec<Observation> = by_date.into_values().collect();

    let points: Vec<DataPoint> = sorted
        .iter()
        .map(|obs| DataPoint {
            date: obs.date,
            value: obs.vv_db.filter(|_| obs.valid),
        })
        .collect();
    let filled = fill_both_directions(&points);

    if filled.iter().all(Option::is_none) && !sorted.is_empty() {
        log::debug!(
            "clean: parcel {} has no valid primary samples",
            sorted[0].parcel
        );
    }

    sorted
        .into_iter()
        .zip(points)
        .zip(filled)
        .map(|((obs, point), value)| CleanedObservation {
            filled: value.is_some() && point.value.filter(|v| v.is_finite()).is_none(),
            parcel: obs.parcel,
            date: obs.date,
            vv_db: value,
            vh_db: obs.vh_db,
            red: obs.red,
            nir: obs.nir,
            valid: obs.valid,
        })
        .collect()
}

#[derive(Serialize)]
struct CleanedRow<'a> {
    forest: &'a str,
    date: String,
    #[serde(rename = "VV")]
    vv: Option<f64>,
    #[serde(rename = "VH")]
    vh: Option<f64>,
    #[serde(rename = "B4_mean")]
    red: Option<f64>,
    #[serde(rename = "B5_mean")]
    nir: Option<f64>,
    valid: u8,
    interpolated_flag: u8,
}

/// Write cleaned observations as CSV (with headers), in the same column
/// naming the radar source table uses.
pub fn write_csv<W: Write>(cleaned: &[CleanedObservation], writer: W) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for obs in cleaned {
        wtr.serialize(CleanedRow {
            forest: &obs.parcel,
            date: canopy_utils::dates::format_date(&obs.date),
            vv: obs.vv_db,
            vh: obs.vh_db,
            red: obs.red,
            nir: obs.nir,
            valid: u8::from(obs.valid),
            interpolated_flag: u8::from(obs.filled),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
