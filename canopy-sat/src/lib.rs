//! Core observation types and ingestion for parcel-level satellite data.
//!
//! Two source tables are read wholesale at startup:
//!
//! - **Radar** (has headers): `forest,date,VV,VH[,valid]` plus any metadata
//!   columns (`system:index`, `.geo`, `orbit`, ...) which are ignored.
//! - **Optical** (has headers): `date,B4_mean,B5_mean[,forest]`.
//!
//! Optical rows are attached to the radar observations they share a date
//! (and parcel, when the optical table names one) with; see
//! [`ingest::attach_optical`].

pub mod error;
pub mod ingest;
pub mod observation;

pub use error::SatError;
pub use observation::{Observation, OpticalObservation};
