//! Policy evaluation and economic prediction commands.

use crate::pipeline::Pipeline;
use crate::query::print_json;
use crate::settings::Settings;
use canopy_eval::{
    ChatReportGenerator, CorrelationModule, EconomicSeries, EvalError, EvaluationCache,
    IndexEconomyCorrelation, WorldBankGdp,
};
use futures::future::join_all;
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;

fn correlation(pipeline: &Pipeline, settings: &Settings) -> anyhow::Result<IndexEconomyCorrelation> {
    let economic: Arc<dyn EconomicSeries> = Arc::new(WorldBankGdp::new(
        &settings.country,
        settings.start_year,
        settings.end_year,
    )?);
    Ok(IndexEconomyCorrelation::new(
        pipeline.db.clone(),
        economic,
        settings.correlation_index,
    ))
}

/// Build the evaluation cache with the HTTP-backed collaborators.
pub fn build_cache(pipeline: &Pipeline, settings: &Settings) -> anyhow::Result<EvaluationCache> {
    let reports = ChatReportGenerator::new(pipeline.db.clone(), settings.chat_config())?;
    Ok(EvaluationCache::new(
        Arc::new(reports),
        Arc::new(correlation(pipeline, settings)?),
        settings.cache_config(),
    ))
}

/// Evaluate every listed parcel concurrently through one cache.
///
/// Repeated keys share a single computation. Results are printed in input
/// order; the command fails if any evaluation failed.
pub async fn run_evaluate(
    pipeline: &Pipeline,
    settings: &Settings,
    parcels: &str,
) -> anyhow::Result<()> {
    let keys: Vec<&str> = parcels.split(',').map(str::trim).collect();
    let cache = build_cache(pipeline, settings)?;
    info!("Evaluating {} parcel(s)", keys.len());

    let results = join_all(keys.iter().map(|key| cache.get_or_compute(key))).await;

    let mut failed = 0;
    let output: Vec<serde_json::Value> = keys
        .iter()
        .zip(results)
        .map(|(key, result)| match result {
            Ok(evaluation) => json!({ "parcel": key, "evaluation": evaluation }),
            Err(e) => {
                warn!("Evaluation of '{}' failed: {}", key, e);
                failed += 1;
                json!({ "parcel": key, "error": e.to_string() })
            }
        })
        .collect();
    print_json(&output)?;

    if failed > 0 {
        anyhow::bail!("{} of {} evaluations failed", failed, keys.len());
    }
    Ok(())
}

pub async fn run_predict(
    pipeline: &Pipeline,
    settings: &Settings,
    parcel: &str,
    value: f64,
) -> anyhow::Result<()> {
    let module = correlation(pipeline, settings)?;
    let predicted = module
        .predict(parcel, value)
        .await?
        .ok_or_else(|| EvalError::InsufficientData {
            parcel: parcel.to_string(),
        })?;
    print_json(&json!({
        "parcel": parcel,
        "index_column": settings.correlation_index,
        "index_value": value,
        "predicted": predicted,
    }))
}
