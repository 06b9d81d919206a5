//! Baseline-vs-quantized latency comparison.
//!
//! One comparison runs the latency runner against a full-precision baseline
//! collection and then against each quantized candidate, first with
//! rescoring disabled and, where the method supports it, again with
//! rescoring enabled. Speedups are relative p95 ratios against the
//! baseline. Candidates fail independently; one broken collection never
//! costs the rest of the comparison.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{SearchOptions, VectorBackend};
use crate::bench::runner::{BenchmarkResult, LatencyRunner, Query};
use crate::config::{BenchmarkConfig, Deadline};
use crate::error::Result;

// ============================================================================
// Value objects
// ============================================================================

/// One quantized collection to measure against the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationCandidate {
    /// Method key in the report, e.g. "scalar-int8".
    pub method: String,
    pub collection: String,
    /// Binary-style methods that cannot rescore skip the second pass.
    pub supports_rescore: bool,
}

impl QuantizationCandidate {
    pub fn new(method: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            collection: collection.into(),
            supports_rescore: true,
        }
    }

    pub fn without_rescore(mut self) -> Self {
        self.supports_rescore = false;
        self
    }
}

/// Measurements and speedups for one quantization method. Fields stay
/// `None` when the corresponding pass did not run or did not produce a
/// defined value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_rescore: Option<BenchmarkResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_rescore: Option<BenchmarkResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup_no_rescore: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speedup_with_rescore: Option<f64>,
    /// Set when a speedup was undefined (a variant p95 of zero).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly: Option<String>,
    /// Set when the candidate's measurement failed outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full comparison artifact, keyed by method name in sorted order so
/// repeated runs serialize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub baseline: BenchmarkResult,
    #[serde(rename = "quantization")]
    pub methods: BTreeMap<String, MethodReport>,
    /// True when a deadline cut the comparison short or any sub-run was
    /// itself incomplete.
    #[serde(default)]
    pub incomplete: bool,
}

/// Relative speedup `baseline_p95 / variant_p95`. `None` when the variant
/// p95 is zero; callers surface that as an anomaly instead of a numeric
/// artifact.
fn speedup(baseline_p95: f64, variant_p95: f64) -> Option<f64> {
    (variant_p95 > 0.0).then(|| baseline_p95 / variant_p95)
}

fn push_anomaly(report: &mut MethodReport, message: String) {
    match &mut report.anomaly {
        Some(existing) => {
            existing.push_str("; ");
            existing.push_str(&message);
        }
        None => report.anomaly = Some(message),
    }
}

// ============================================================================
// Comparator
// ============================================================================

/// Drives the latency runner across a baseline and quantized candidates.
pub struct QuantizationComparator<B> {
    backend: Arc<B>,
    config: BenchmarkConfig,
}

impl<B: VectorBackend + 'static> QuantizationComparator<B> {
    pub fn new(backend: Arc<B>, config: BenchmarkConfig) -> Self {
        Self { backend, config }
    }

    /// Compare `candidates` against `baseline_collection`.
    ///
    /// A failing baseline run is fatal since every speedup is relative to
    /// it; candidate failures are recorded in their own entry.
    #[tracing::instrument(skip(self, candidates, queries))]
    pub async fn compare(
        &self,
        baseline_collection: &str,
        candidates: &[QuantizationCandidate],
        queries: &[Query],
    ) -> Result<ComparisonReport> {
        self.config.validate()?;
        let deadline = Deadline::start(self.config.max_runtime);
        let runner = LatencyRunner::new(Arc::clone(&self.backend), self.config.clone());

        let baseline = runner
            .measure(
                baseline_collection,
                queries,
                &SearchOptions::default(),
                "baseline",
            )
            .await?;

        let mut methods = BTreeMap::new();
        let mut stopped = false;
        for candidate in candidates {
            if deadline.expired() {
                tracing::warn!(
                    method = %candidate.method,
                    "deadline expired, stopping comparison"
                );
                stopped = true;
                break;
            }
            let report = self
                .measure_candidate(&runner, candidate, queries, &baseline, deadline)
                .await;
            methods.insert(candidate.method.clone(), report);
        }

        let incomplete = stopped
            || baseline.incomplete
            || methods.values().any(|m| {
                m.no_rescore.as_ref().is_some_and(|r| r.incomplete)
                    || m.with_rescore.as_ref().is_some_and(|r| r.incomplete)
            });
        tracing::info!(
            baseline = baseline_collection,
            methods = methods.len(),
            incomplete,
            "comparison finished"
        );
        Ok(ComparisonReport {
            baseline,
            methods,
            incomplete,
        })
    }

    async fn measure_candidate(
        &self,
        runner: &LatencyRunner<B>,
        candidate: &QuantizationCandidate,
        queries: &[Query],
        baseline: &BenchmarkResult,
        deadline: Deadline,
    ) -> MethodReport {
        let mut report = MethodReport::default();

        // First pass: quantized scoring only, no rescore.
        let no_rescore_options = SearchOptions::default().with_rescore(false);
        let label = format!("{} (no rescore)", candidate.method);
        match runner
            .measure(&candidate.collection, queries, &no_rescore_options, &label)
            .await
        {
            Ok(result) => {
                match speedup(baseline.metrics.p95_ms, result.metrics.p95_ms) {
                    Some(value) => report.speedup_no_rescore = Some(value),
                    None => push_anomaly(
                        &mut report,
                        format!("p95 of zero for '{}' without rescore", candidate.collection),
                    ),
                }
                report.no_rescore = Some(result);
            }
            Err(error) => {
                tracing::warn!(
                    method = %candidate.method,
                    collection = %candidate.collection,
                    %error,
                    "candidate measurement failed"
                );
                report.error = Some(error.to_string());
                // The second pass would hit the same collection; skip it.
                return report;
            }
        }

        if !candidate.supports_rescore || deadline.expired() {
            return report;
        }

        // Second pass: rescore quantized hits with full-precision vectors.
        let rescore_options =
            SearchOptions::quantized(self.config.rescore_oversampling, true);
        let label = format!("{} (rescore)", candidate.method);
        match runner
            .measure(&candidate.collection, queries, &rescore_options, &label)
            .await
        {
            Ok(result) => {
                match speedup(baseline.metrics.p95_ms, result.metrics.p95_ms) {
                    Some(value) => report.speedup_with_rescore = Some(value),
                    None => push_anomaly(
                        &mut report,
                        format!("p95 of zero for '{}' with rescore", candidate.collection),
                    ),
                }
                report.with_rescore = Some(result);
            }
            Err(error) => {
                tracing::warn!(
                    method = %candidate.method,
                    collection = %candidate.collection,
                    %error,
                    "rescore measurement failed"
                );
                report.error = Some(error.to_string());
            }
        }
        report
    }
}
