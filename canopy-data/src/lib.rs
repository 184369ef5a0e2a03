//! Data processing for parcel observations.
//!
//! This crate turns raw [`canopy_sat::Observation`]s into the derived
//! table served by the query layer:
//!
//! 1. [`clean`] partitions by parcel, sorts, de-duplicates and fills gaps
//!    in the primary radar channel ([`interpolation`] does the per-series
//!    math).
//! 2. [`features`] converts decibels to linear power and computes the
//!    radar and optical indices plus the alert flag.
//!
//! Both steps are pure; running them twice on the same input yields the
//! same output.

pub mod clean;
pub mod features;
pub mod interpolation;

pub use clean::{clean, CleanedObservation};
pub use features::{DerivedRecord, FeatureConfig, FeatureEngine, OpticalRecord};
