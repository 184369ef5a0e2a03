//! Correlation between a parcel's yearly vegetation index and an economic
//! series.

use crate::economy::EconomicSeries;
use crate::error::{EvalError, Result};
use crate::stats::{pearson, pearson_p_value, LinearFit};
use async_trait::async_trait;
use canopy_db::{Database, IndexColumn, YearValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const INSUFFICIENT_DATA: &str = "Insufficient data for regression";

/// One year present in both series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergedRow {
    pub year: i32,
    pub index: f64,
    pub economic: f64,
}

/// Result of correlating a parcel's index with the economic series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationAnalysis {
    /// Pearson r; absent below two merged rows or for a constant series.
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
    pub merged: Vec<MergedRow>,
    pub regression_summary: String,
}

#[async_trait]
pub trait CorrelationModule: Send + Sync {
    async fn analyze(&self, parcel: &str) -> Result<CorrelationAnalysis>;

    /// Predicted economic value for an index value; `None` when no
    /// regression can be fitted.
    async fn predict(&self, parcel: &str, index_value: f64) -> Result<Option<f64>>;
}

/// Inner join on year, ordered by year.
pub fn merge_on_year(index: &[YearValue], economic: &[YearValue]) -> Vec<MergedRow> {
    let economic: BTreeMap<i32, f64> = economic.iter().map(|p| (p.year, p.value)).collect();
    let mut merged: Vec<MergedRow> = index
        .iter()
        .filter_map(|p| {
            economic.get(&p.year).map(|&e| MergedRow {
                year: p.year,
                index: p.value,
                economic: e,
            })
        })
        .collect();
    merged.sort_by_key(|r| r.year);
    merged.dedup_by_key(|r| r.year);
    merged
}

fn columns(merged: &[MergedRow]) -> (Vec<f64>, Vec<f64>) {
    merged.iter().map(|r| (r.index, r.economic)).unzip()
}

/// Correlation and regression over already merged rows.
pub fn analyze_merged(merged: Vec<MergedRow>, dependent: &str, regressor: &str) -> CorrelationAnalysis {
    let (x, y) = columns(&merged);
    let correlation = pearson(&x, &y);
    let p_value = correlation.map(|r| pearson_p_value(r, merged.len()));
    let regression_summary = LinearFit::fit(&x, &y)
        .map_or_else(|| INSUFFICIENT_DATA.to_string(), |fit| fit.summary(dependent, regressor));
    CorrelationAnalysis {
        correlation,
        p_value,
        merged,
        regression_summary,
    }
}

/// Correlates one derived index column against an [`EconomicSeries`].
pub struct IndexEconomyCorrelation {
    db: Database,
    economic: Arc<dyn EconomicSeries>,
    column: IndexColumn,
}

impl IndexEconomyCorrelation {
    pub fn new(db: Database, economic: Arc<dyn EconomicSeries>, column: IndexColumn) -> Self {
        Self {
            db,
            economic,
            column,
        }
    }

    async fn merged(&self, parcel: &str) -> Result<Vec<MergedRow>> {
        let index = self.db.query_yearly_index(parcel, self.column)?;
        let economic = self.economic.yearly_series().await?;
        let merged = merge_on_year(&index, &economic);
        log::info!(
            "correlation: {} has {} index years, {} economic years, {} merged",
            parcel,
            index.len(),
            economic.len(),
            merged.len()
        );
        Ok(merged)
    }
}

#[async_trait]
impl CorrelationModule for IndexEconomyCorrelation {
    async fn analyze(&self, parcel: &str) -> Result<CorrelationAnalysis> {
        let merged = self.merged(parcel).await?;
        Ok(analyze_merged(
            merged,
            self.economic.name(),
            self.column.as_str(),
        ))
    }

    async fn predict(&self, parcel: &str, index_value: f64) -> Result<Option<f64>> {
        if !index_value.is_finite() {
            return Err(EvalError::Query(format!(
                "index value must be finite, got {index_value}"
            )));
        }
        let merged = self.merged(parcel).await?;
        let (x, y) = columns(&merged);
        Ok(LinearFit::fit(&x, &y).map(|fit| fit.predict(index_value)))
    }
}
