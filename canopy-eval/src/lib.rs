//! Per-parcel policy evaluation.
//!
//! An evaluation combines a narrative report from a text-generation model
//! with a correlation between the parcel's yearly vegetation index and an
//! economic series. Both are slow network-bound computations, so results are
//! memoised in an [`EvaluationCache`] with at most one computation in flight
//! per parcel.
//!
//! The collaborators are traits ([`ReportGenerator`], [`EconomicSeries`],
//! [`CorrelationModule`]) injected into the cache, with HTTP-backed
//! implementations for production use.

pub mod cache;
pub mod correlation;
pub mod economy;
pub mod error;
pub mod report;
pub mod stats;

pub use cache::{CacheConfig, CacheEntry, Evaluation, EvaluationCache};
pub use correlation::{CorrelationAnalysis, CorrelationModule, IndexEconomyCorrelation, MergedRow};
pub use economy::{EconomicSeries, WorldBankGdp};
pub use error::EvalError;
pub use report::{ChatConfig, ChatReportGenerator, ReportGenerator};
