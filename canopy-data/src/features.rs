//! Radar and optical vegetation index derivation.
//!
//! Zero handling is the same for both branches: inputs are sanitised first
//! (missing or non-finite values become 0), then every division goes through
//! [`safe_ratio`], which yields the default for a zero denominator or a
//! non-finite quotient.

use crate::clean::CleanedObservation;
use canopy_sat::OpticalObservation;
use canopy_utils::dates::year_month;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Dryness index level above which a record raises an alert.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.61;

/// Landsat collection-2 surface reflectance scale factor.
pub const LANDSAT_REFLECTANCE_SCALE: f64 = 2.75e-05;

/// Tunables for the feature derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Alert when the dryness index (RFDI) is strictly above this value.
    pub alert_threshold: f64,
    /// Multiplier from raw optical digital counts to reflectance.
    pub optical_scale: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            optical_scale: LANDSAT_REFLECTANCE_SCALE,
        }
    }
}

/// Replace a missing or non-finite value with zero.
pub fn sanitize(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Convert decibels to linear power: `10^(dB/10)`.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// `numerator / denominator`, or `default` when the denominator is exactly
/// zero or the quotient is not finite.
pub fn safe_ratio(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 {
        return default;
    }
    let q = numerator / denominator;
    if q.is_finite() {
        q
    } else {
        default
    }
}

/// Linear powers and ratio indices for one dual-polarisation reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadarIndices {
    pub vv_lin: f64,
    pub vh_lin: f64,
    /// Cross ratio VH / VV.
    pub vh_vv_ratio: f64,
    /// Radar vegetation index `4 VH / (VV + VH)`.
    pub rvi: f64,
    /// Radar forest degradation (dryness) index `(VV - VH) / (VV + VH)`.
    pub rfdi: f64,
}

impl RadarIndices {
    /// Compute from (already sanitised) decibel values.
    pub fn from_db(vv_db: f64, vh_db: f64) -> Self {
        Self::from_linear(
            sanitize(Some(db_to_linear(vv_db))),
            sanitize(Some(db_to_linear(vh_db))),
        )
    }

    /// Compute from linear powers directly.
    pub fn from_linear(vv_lin: f64, vh_lin: f64) -> Self {
        let sum = vv_lin + vh_lin;
        Self {
            vv_lin,
            vh_lin,
            vh_vv_ratio: safe_ratio(vh_lin, vv_lin, 0.0),
            rvi: safe_ratio(4.0 * vh_lin, sum, 0.0),
            rfdi: safe_ratio(vv_lin - vh_lin, sum, 0.0),
        }
    }
}

/// Reflectances and normalised difference index for one optical reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalIndex {
    pub red_ref: f64,
    pub nir_ref: f64,
    /// `(NIR - RED) / (NIR + RED)`.
    pub ndvi: f64,
}

impl OpticalIndex {
    pub fn from_raw(red: Option<f64>, nir: Option<f64>, scale: f64) -> Self {
        let red_ref = sanitize(Some(sanitize(red) * scale));
        let nir_ref = sanitize(Some(sanitize(nir) * scale));
        Self {
            red_ref,
            nir_ref,
            ndvi: safe_ratio(nir_ref - red_ref, nir_ref + red_ref, 0.0),
        }
    }
}

/// A cleaned observation with every derived column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRecord {
    pub parcel: String,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    /// Sanitised primary channel, dB.
    pub vv_db: f64,
    /// Sanitised secondary channel, dB.
    pub vh_db: f64,
    pub vv_lin: f64,
    pub vh_lin: f64,
    pub vh_vv_ratio: f64,
    pub rvi: f64,
    pub rfdi: f64,
    pub red_ref: f64,
    pub nir_ref: f64,
    pub ndvi: f64,
    /// Primary channel value came from interpolation.
    pub filled: bool,
    /// 1 when `rfdi` exceeds the alert threshold, else 0.
    pub alert: u8,
}

/// An optical-only reading with its derived index, for the standalone
/// optical trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticalRecord {
    pub parcel: Option<String>,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub red_ref: f64,
    pub nir_ref: f64,
    pub ndvi: f64,
}

/// Stateless derivation of [`DerivedRecord`]s from cleaned observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// 1 when the dryness index is strictly above the threshold.
    pub fn alert(&self, rfdi: f64) -> u8 {
        u8::from(rfdi > self.config.alert_threshold)
    }

    /// Derive one record.
    pub fn derive_one(&self, obs: &CleanedObservation) -> DerivedRecord {
        let vv_db = sanitize(obs.vv_db);
        let vh_db = sanitize(obs.vh_db);
        let radar = RadarIndices::from_db(vv_db, vh_db);
        let optical = OpticalIndex::from_raw(obs.red, obs.nir, self.config.optical_scale);
        let (year, month) = year_month(&obs.date);

        DerivedRecord {
            parcel: obs.parcel.clone(),
            date: obs.date,
            year,
            month,
            vv_db,
            vh_db,
            vv_lin: radar.vv_lin,
            vh_lin: radar.vh_lin,
            vh_vv_ratio: radar.vh_vv_ratio,
            rvi: radar.rvi,
            rfdi: radar.rfdi,
            red_ref: optical.red_ref,
            nir_ref: optical.nir_ref,
            ndvi: optical.ndvi,
            filled: obs.filled,
            alert: self.alert(radar.rfdi),
        }
    }

    /// Derive every record, preserving input order.
    pub fn derive(&self, cleaned: &[CleanedObservation]) -> Vec<DerivedRecord> {
        let records: Vec<DerivedRecord> = cleaned.iter().map(|c| self.derive_one(c)).collect();
        let alerts = records.iter().filter(|r| r.alert == 1).count();
        log::info!(
            "features: derived {} records, {} alerts at threshold {}",
            records.len(),
            alerts,
            self.config.alert_threshold
        );
        records
    }

    /// Derive optical-only records from the standalone optical table.
    pub fn derive_optical(&self, optical: &[OpticalObservation]) -> Vec<OpticalRecord> {
        optical
            .iter()
            .map(|o| {
                let index = OpticalIndex::from_raw(o.red, o.nir, self.config.optical_scale);
                let (year, month) = year_month(&o.date);
                OpticalRecord {
                    parcel: o.parcel.clone(),
                    date: o.date,
                    year,
                    month,
                    red_ref: index.red_ref,
                    nir_ref: index.nir_ref,
                    ndvi: index.ndvi,
                }
            })
            .collect()
    }
}
