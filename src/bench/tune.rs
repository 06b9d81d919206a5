//! Oversampling factor sweep with optional accuracy retention.
//!
//! Each factor gets its own latency run with that oversampling applied to
//! the quantized search. When a full-precision baseline collection is
//! supplied, a second untimed pass searches each query against both
//! collections and averages the top-`limit` id overlap into the trial's
//! accuracy retention. Factors are evaluated and reported in caller order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{SearchOptions, VectorBackend};
use crate::bench::metrics::{top_k_overlap, LatencyMetrics};
use crate::bench::runner::{LatencyRunner, Query};
use crate::config::{BenchmarkConfig, Deadline};
use crate::error::{Error, Result};

// ============================================================================
// Value objects
// ============================================================================

/// One sweep entry: latency metrics for a factor plus optional retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OversamplingTrial {
    pub factor: f64,
    #[serde(flatten)]
    pub metrics: LatencyMetrics,
    /// Mean top-`limit` overlap with the baseline, in [0, 1]. Absent when
    /// no baseline collection was supplied or no query pair succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_retention: Option<f64>,
    /// Set when the factor's measurement failed outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OversamplingTrial {
    pub fn csv_header() -> &'static str {
        "factor,count,avg_ms,p50_ms,p90_ms,p95_ms,p99_ms,p995_ms,p999_ms,error_count,accuracy_retention"
    }

    pub fn to_csv_row(&self) -> String {
        let retention = self
            .accuracy_retention
            .map(|r| format!("{r:.4}"))
            .unwrap_or_default();
        format!(
            "{},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3},{},{}",
            self.factor,
            self.metrics.count,
            self.metrics.avg_ms,
            self.metrics.p50_ms,
            self.metrics.p90_ms,
            self.metrics.p95_ms,
            self.metrics.p99_ms,
            self.metrics.p995_ms,
            self.metrics.p999_ms,
            self.metrics.error_count,
            retention
        )
    }
}

/// Sweep artifact. Trials appear in the order the factors were configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningReport {
    pub collection: String,
    pub trials: Vec<OversamplingTrial>,
    /// True when a deadline cut the sweep short or any trial's run was
    /// itself incomplete.
    #[serde(default)]
    pub incomplete: bool,
}

// ============================================================================
// Tuner
// ============================================================================

/// Sweeps an oversampling grid against one quantized collection.
pub struct OversamplingTuner<B> {
    backend: Arc<B>,
    config: BenchmarkConfig,
}

impl<B: VectorBackend + 'static> OversamplingTuner<B> {
    pub fn new(backend: Arc<B>, config: BenchmarkConfig) -> Self {
        Self { backend, config }
    }

    /// Sweep the configured factors over `collection`.
    ///
    /// Per-factor failures land in that trial's `error`; the sweep itself
    /// only fails for invalid input.
    #[tracing::instrument(skip(self, queries))]
    pub async fn tune(
        &self,
        collection: &str,
        queries: &[Query],
        baseline_collection: Option<&str>,
    ) -> Result<TuningReport> {
        self.config.validate()?;
        if queries.is_empty() {
            return Err(Error::config("no queries to sweep"));
        }
        let deadline = Deadline::start(self.config.max_runtime);
        let runner = LatencyRunner::new(Arc::clone(&self.backend), self.config.clone());

        let mut trials = Vec::with_capacity(self.config.oversampling_factors.len());
        let mut incomplete = false;
        for &factor in &self.config.oversampling_factors {
            if deadline.expired() {
                tracing::warn!(collection, factor, "deadline expired, stopping sweep");
                incomplete = true;
                break;
            }
            let (trial, cut_short) = self
                .run_trial(&runner, collection, queries, factor, baseline_collection)
                .await;
            incomplete = incomplete || cut_short;
            trials.push(trial);
        }

        tracing::info!(collection, trials = trials.len(), incomplete, "sweep finished");
        Ok(TuningReport {
            collection: collection.to_string(),
            trials,
            incomplete,
        })
    }

    async fn run_trial(
        &self,
        runner: &LatencyRunner<B>,
        collection: &str,
        queries: &[Query],
        factor: f64,
        baseline_collection: Option<&str>,
    ) -> (OversamplingTrial, bool) {
        let options = SearchOptions::quantized(factor, true);
        let label = format!("oversampling {factor}");
        match runner.measure(collection, queries, &options, &label).await {
            Ok(result) => {
                let mut metrics = result.metrics;
                let mut accuracy_retention = None;
                if let Some(baseline) = baseline_collection {
                    if !result.incomplete {
                        let (retention, errors) = self
                            .retention_pass(collection, baseline, queries, &options)
                            .await;
                        accuracy_retention = retention;
                        metrics.error_count += errors;
                    }
                }
                let trial = OversamplingTrial {
                    factor,
                    metrics,
                    accuracy_retention,
                    error: None,
                };
                (trial, result.incomplete)
            }
            Err(error) => {
                tracing::warn!(collection, factor, %error, "sweep factor failed");
                let metrics = LatencyMetrics {
                    error_count: queries.len(),
                    ..LatencyMetrics::default()
                };
                let trial = OversamplingTrial {
                    factor,
                    metrics,
                    accuracy_retention: None,
                    error: Some(error.to_string()),
                };
                (trial, false)
            }
        }
    }

    /// Untimed pass: the same search against candidate and baseline, with
    /// the top-`limit` overlap averaged over queries where both sides
    /// succeeded. A query whose pair fails is excluded from the average but
    /// still counts one error.
    async fn retention_pass(
        &self,
        collection: &str,
        baseline: &str,
        queries: &[Query],
        options: &SearchOptions,
    ) -> (Option<f64>, usize) {
        let limit = self.config.limit;
        let mut samples = Vec::with_capacity(queries.len());
        let mut errors = 0usize;
        for (index, query) in queries.iter().enumerate() {
            let candidate = self
                .backend
                .search(collection, &query.vector, limit, options)
                .await;
            let reference = self
                .backend
                .search(baseline, &query.vector, limit, &SearchOptions::default())
                .await;
            match (candidate, reference) {
                (Ok(candidate), Ok(reference)) => {
                    let candidate_ids: Vec<u64> = candidate.iter().map(|p| p.id).collect();
                    let reference_ids: Vec<u64> = reference.iter().map(|p| p.id).collect();
                    samples.push(top_k_overlap(&reference_ids, &candidate_ids, limit));
                }
                _ => {
                    errors += 1;
                    tracing::debug!(collection, query = index, "retention pair failed");
                }
            }
        }
        let average = if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<f64>() / samples.len() as f64)
        };
        (average, errors)
    }
}
