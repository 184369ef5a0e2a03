//! Memoised per-parcel evaluations.
//!
//! Each parcel key owns a [`OnceCell`]. The first caller for a key runs the
//! collaborators while later callers for the same key wait on that cell;
//! callers for other keys only touch the map long enough to fetch their cell.
//! A failed or timed out computation stores nothing, so the next call starts
//! over. Invalidation only drops finished entries; a computation in flight
//! always completes into its own cell.

use crate::correlation::{CorrelationAnalysis, CorrelationModule};
use crate::error::{EvalError, Result};
use crate::report::ReportGenerator;
use canopy_db::filter::parcel_key;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;

pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Upper bound on one computation; exceeding it is a failure.
    pub timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }
}

/// A stored evaluation. Never mutated once created.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CacheEntry {
    pub parcel: String,
    pub results: String,
    pub correlation_analysis: CorrelationAnalysis,
    pub last_updated: DateTime<Utc>,
}

/// What a caller gets back: the shared entry plus whether it was served
/// from the cache.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub entry: Arc<CacheEntry>,
    pub cached: bool,
}

impl Serialize for Evaluation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Evaluation", 4)?;
        s.serialize_field("results", &self.entry.results)?;
        s.serialize_field("correlation_analysis", &self.entry.correlation_analysis)?;
        s.serialize_field("cached", &self.cached)?;
        s.serialize_field("last_updated", &self.entry.last_updated)?;
        s.end()
    }
}

type Slot = Arc<OnceCell<Arc<CacheEntry>>>;

pub struct EvaluationCache {
    reports: Arc<dyn ReportGenerator>,
    correlation: Arc<dyn CorrelationModule>,
    config: CacheConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl EvaluationCache {
    pub fn new(
        reports: Arc<dyn ReportGenerator>,
        correlation: Arc<dyn CorrelationModule>,
        config: CacheConfig,
    ) -> Self {
        Self {
            reports,
            correlation,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    /// Return the stored evaluation for `parcel`, computing it once if absent.
    pub async fn get_or_compute(&self, parcel: &str) -> Result<Evaluation> {
        let key = parcel_key(parcel).map_err(|_| EvalError::EmptyParcelKey)?;
        let slot = self.slot(key);

        let mut computed = false;
        let ran_init = &mut computed;
        let result = slot
            .get_or_try_init(|| async move {
                *ran_init = true;
                self.compute(key).await
            })
            .await
            .cloned();

        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                self.release_empty(key, slot);
                return Err(e);
            }
        };

        if !computed {
            log::debug!("cache: hit for {}", key);
        }
        Ok(Evaluation {
            entry,
            cached: !computed,
        })
    }

    /// Forget a slot left empty by a failed computation, unless another
    /// caller still holds it and may retry.
    fn release_empty(&self, key: &str, slot: Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let ours = slots.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot));
        // one reference in the map, one here
        if ours && !slot.initialized() && Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
    }

    async fn compute(&self, key: &str) -> Result<Arc<CacheEntry>> {
        log::info!("cache: computing evaluation for {}", key);
        let work = async {
            tokio::try_join!(self.reports.evaluate(key), self.correlation.analyze(key))
        };
        let (results, correlation_analysis) = tokio::time::timeout(self.config.timeout, work)
            .await
            .map_err(|_| EvalError::Timeout {
                parcel: key.to_string(),
                after: self.config.timeout,
            })?
            .map_err(|e| {
                log::warn!("cache: evaluation for {} failed: {}", key, e);
                e
            })?;

        Ok(Arc::new(CacheEntry {
            parcel: key.to_string(),
            results,
            correlation_analysis,
            last_updated: Utc::now(),
        }))
    }

    /// Drop the stored entry for one parcel; returns whether one was stored.
    ///
    /// A computation still in flight is left alone so that a concurrent
    /// request cannot start a second one for the same key.
    pub fn invalidate(&self, parcel: &str) -> bool {
        let key = parcel.trim();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(key).is_some_and(|slot| slot.initialized()) {
            slots.remove(key);
            return true;
        }
        false
    }

    /// Drop every stored entry. Computations in flight are kept.
    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, slot| !slot.initialized());
    }

    /// Number of stored (completed) evaluations.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct SlowReports {
        calls: AtomicUsize,
        delay: Duration,
        fail_first: bool,
    }

    #[async_trait]
    impl ReportGenerator for SlowReports {
        async fn evaluate(&self, parcel: &str) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail_first && n == 0 {
                return Err(EvalError::Report {
                    message: "model unavailable".to_string(),
                });
            }
            Ok(format!("report for {parcel} #{n}"))
        }
    }

    struct StaticCorrelation;

    #[async_trait]
    impl CorrelationModule for StaticCorrelation {
        async fn analyze(&self, _parcel: &str) -> Result<CorrelationAnalysis> {
            Ok(CorrelationAnalysis {
                correlation: Some(0.5),
                p_value: Some(0.2),
                merged: Vec::new(),
                regression_summary: "summary".to_string(),
            })
        }

        async fn predict(&self, _parcel: &str, _index_value: f64) -> Result<Option<f64>> {
            Ok(None)
        }
    }

    fn cache_with(reports: Arc<SlowReports>, timeout: Duration) -> EvaluationCache {
        EvaluationCache::new(reports, Arc::new(StaticCorrelation), CacheConfig { timeout })
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let reports = Arc::new(SlowReports::default());
        let cache = cache_with(reports.clone(), DEFAULT_EVAL_TIMEOUT);

        let first = cache.get_or_compute("Kibwezi").await.unwrap();
        let second = cache.get_or_compute(" Kibwezi ").await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.entry, &second.entry));
        assert_eq!(reports.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_same_key_computes_once() {
        let reports = Arc::new(SlowReports {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let cache = cache_with(reports.clone(), DEFAULT_EVAL_TIMEOUT);

        let (a, b) = tokio::join!(cache.get_or_compute("Kibwezi"), cache.get_or_compute("Kibwezi"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(reports.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.entry, &b.entry));
        assert!(a.cached != b.cached, "exactly one caller computed");
    }

    #[tokio::test]
    async fn failure_is_not_cached_and_retries() {
        let reports = Arc::new(SlowReports {
            fail_first: true,
            ..Default::default()
        });
        let cache = cache_with(reports.clone(), DEFAULT_EVAL_TIMEOUT);

        let err = cache.get_or_compute("Makongo").await.unwrap_err();
        assert!(matches!(err, EvalError::Report { .. }));
        assert!(cache.is_empty());

        let retry = cache.get_or_compute("Makongo").await.unwrap();
        assert!(!retry.cached);
        assert_eq!(retry.entry.results, "report for Makongo #1");
        assert_eq!(reports.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_computation_times_out() {
        let reports = Arc::new(SlowReports {
            delay: Duration::from_millis(500),
            ..Default::default()
        });
        let cache = cache_with(reports, Duration::from_millis(20));
        let err = cache.get_or_compute("Kibwezi").await.unwrap_err();
        assert!(matches!(err, EvalError::Timeout { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let cache = cache_with(Arc::new(SlowReports::default()), DEFAULT_EVAL_TIMEOUT);
        assert!(matches!(
            cache.get_or_compute("  ").await,
            Err(EvalError::EmptyParcelKey)
        ));
    }

    #[tokio::test]
    async fn invalidate_and_clear_force_recompute() {
        let reports = Arc::new(SlowReports::default());
        let cache = cache_with(reports.clone(), DEFAULT_EVAL_TIMEOUT);

        cache.get_or_compute("A").await.unwrap();
        cache.get_or_compute("B").await.unwrap();
        assert!(cache.invalidate("A"));
        assert!(!cache.invalidate("A"));
        assert!(!cache.get_or_compute("A").await.unwrap().cached);
        assert!(cache.get_or_compute("B").await.unwrap().cached);

        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.get_or_compute("B").await.unwrap().cached);
        assert_eq!(reports.calls.load(Ordering::SeqCst), 4);
    }

    struct GatedReports {
        gate: Notify,
    }

    #[async_trait]
    impl ReportGenerator for GatedReports {
        async fn evaluate(&self, parcel: &str) -> Result<String> {
            if parcel == "Blocked" {
                self.gate.notified().await;
            }
            Ok(parcel.to_string())
        }
    }

    #[tokio::test]
    async fn invalidate_during_computation_keeps_single_flight() {
        let reports = Arc::new(SlowReports {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let cache = Arc::new(cache_with(reports.clone(), DEFAULT_EVAL_TIMEOUT));

        let first = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_compute("Kibwezi").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!cache.invalidate("Kibwezi"), "nothing stored yet");
        cache.clear();
        let second = cache.get_or_compute("Kibwezi").await.unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(reports.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.entry, &second.entry));
        assert!(!first.cached);
        assert!(second.cached);
    }

    #[tokio::test]
    async fn failed_computation_leaves_no_slot() {
        let reports = Arc::new(SlowReports {
            fail_first: true,
            ..Default::default()
        });
        let cache = cache_with(reports, DEFAULT_EVAL_TIMEOUT);

        assert!(cache.get_or_compute("Nowhere").await.is_err());
        assert!(cache.slots.lock().unwrap().is_empty());

        cache.get_or_compute("Nowhere").await.unwrap();
        assert_eq!(cache.slots.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn timed_out_computation_leaves_no_slot() {
        let reports = Arc::new(SlowReports {
            delay: Duration::from_millis(500),
            ..Default::default()
        });
        let cache = cache_with(reports, Duration::from_millis(20));
        assert!(cache.get_or_compute("Kibwezi").await.is_err());
        assert!(cache.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let reports = Arc::new(GatedReports { gate: Notify::new() });
        let cache = Arc::new(EvaluationCache::new(
            reports.clone(),
            Arc::new(StaticCorrelation),
            CacheConfig::default(),
        ));

        let blocked = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get_or_compute("Blocked").await }
        });
        tokio::task::yield_now().await;

        let other = tokio::time::timeout(Duration::from_secs(1), cache.get_or_compute("Free"))
            .await
            .expect("unrelated key should not wait")
            .unwrap();
        assert_eq!(other.entry.results, "Free");

        reports.gate.notify_one();
        let blocked = blocked.await.unwrap().unwrap();
        assert_eq!(blocked.entry.results, "Blocked");
    }

    #[tokio::test]
    async fn evaluation_serializes_flat() {
        let cache = cache_with(Arc::new(SlowReports::default()), DEFAULT_EVAL_TIMEOUT);
        let eval = cache.get_or_compute("Kibwezi").await.unwrap();
        let json = serde_json::to_value(&eval).unwrap();
        assert_eq!(json["results"], "report for Kibwezi #0");
        assert_eq!(json["cached"], false);
        assert_eq!(json["correlation_analysis"]["correlation"], 0.5);
        assert!(json["last_updated"].is_string());
    }
}
