//! Wall-clock latency measurement for a fixed query set.
//!
//! One [`LatencyRunner::measure`] call is one measurement run: optional
//! warmup searches, then one timed search per query. Timing covers the
//! backend call only; query vectors arrive precomputed, so no local
//! encoding is on the clock. Failed queries are tallied and excluded from
//! the sample rather than aborting the run.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::backend::{SearchOptions, VectorBackend};
use crate::bench::metrics::LatencyMetrics;
use crate::config::{BenchmarkConfig, Deadline};
use crate::error::{BackendError, Error, Result};

// ============================================================================
// Value objects
// ============================================================================

/// A benchmark query: informational text plus its precomputed embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub vector: Vec<f32>,
    /// Known-relevant ids, when the dataset ships them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth_ids: Option<Vec<u64>>,
}

impl Query {
    pub fn new(text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            vector,
            ground_truth_ids: None,
        }
    }

    pub fn with_ground_truth(mut self, ids: Vec<u64>) -> Self {
        self.ground_truth_ids = Some(ids);
        self
    }
}

/// One measurement run, immutable once produced.
///
/// Serializes flat: the metrics fields sit next to `label`, which is the
/// shape the downstream report tooling consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub label: String,
    #[serde(flatten)]
    pub metrics: LatencyMetrics,
    /// True when a deadline stopped the run before every query was issued.
    #[serde(default)]
    pub incomplete: bool,
}

// ============================================================================
// Runner
// ============================================================================

/// Issue one search and return its wall-clock latency in milliseconds.
async fn timed_search<B: VectorBackend + ?Sized>(
    backend: &B,
    collection: &str,
    vector: &[f32],
    limit: usize,
    options: &SearchOptions,
) -> Result<f64, BackendError> {
    let started = Instant::now();
    backend.search(collection, vector, limit, options).await?;
    Ok(started.elapsed().as_secs_f64() * 1000.0)
}

/// Times a query set against one collection and aggregates percentiles.
pub struct LatencyRunner<B> {
    backend: Arc<B>,
    config: BenchmarkConfig,
}

impl<B: VectorBackend + 'static> LatencyRunner<B> {
    pub fn new(backend: Arc<B>, config: BenchmarkConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Measure `queries` against `collection` under `options`.
    ///
    /// Fails only for invalid input or when every query errored; per-query
    /// failures otherwise land in `error_count`.
    #[tracing::instrument(skip(self, queries, options))]
    pub async fn measure(
        &self,
        collection: &str,
        queries: &[Query],
        options: &SearchOptions,
        label: &str,
    ) -> Result<BenchmarkResult> {
        self.config.validate()?;
        if queries.is_empty() {
            return Err(Error::config("no queries to measure"));
        }
        let deadline = Deadline::start(self.config.max_runtime);

        self.warm_up(collection, queries, options).await;

        let (latencies, error_count, attempted) = if self.config.concurrency > 1 {
            self.run_pooled(collection, queries, options, deadline).await
        } else {
            self.run_sequential(collection, queries, options, deadline)
                .await
        };

        if error_count == queries.len() {
            return Err(Error::AllQueriesFailed {
                collection: collection.to_string(),
                attempted: error_count,
            });
        }

        let incomplete = attempted < queries.len();
        let metrics = LatencyMetrics::from_latencies(&latencies, error_count);
        tracing::info!(collection, label, %metrics, incomplete, "measurement finished");
        Ok(BenchmarkResult {
            label: label.to_string(),
            metrics,
            incomplete,
        })
    }

    /// Throwaway searches to prime backend caches, cycling through the
    /// query set. Failures are logged and ignored; warmup never touches the
    /// sample.
    async fn warm_up(&self, collection: &str, queries: &[Query], options: &SearchOptions) {
        for i in 0..self.config.warmup_count as usize {
            let query = &queries[i % queries.len()];
            let result = self
                .backend
                .search(collection, &query.vector, self.config.limit, options)
                .await;
            if let Err(error) = result {
                tracing::debug!(collection, error = %error, "warmup search failed");
            }
        }
    }

    async fn run_sequential(
        &self,
        collection: &str,
        queries: &[Query],
        options: &SearchOptions,
        deadline: Deadline,
    ) -> (Vec<f64>, usize, usize) {
        let mut latencies = Vec::with_capacity(queries.len());
        let mut error_count = 0usize;
        let mut attempted = 0usize;
        for (index, query) in queries.iter().enumerate() {
            if deadline.expired() {
                tracing::warn!(
                    collection,
                    next_query = index,
                    "deadline expired, stopping measurement"
                );
                break;
            }
            attempted += 1;
            let result = timed_search(
                &*self.backend,
                collection,
                &query.vector,
                self.config.limit,
                options,
            )
            .await;
            match result {
                Ok(ms) => latencies.push(ms),
                Err(error) => {
                    error_count += 1;
                    tracing::debug!(collection, query = index, error = %error, "query failed");
                }
            }
        }
        (latencies, error_count, attempted)
    }

    /// Fixed-size worker pool draining a bounded MPMC queue of queries.
    /// Workers keep local tallies that are merged after join, so the
    /// aggregate counts are race-free and the percentile math sees the same
    /// multiset of latencies regardless of interleaving.
    async fn run_pooled(
        &self,
        collection: &str,
        queries: &[Query],
        options: &SearchOptions,
        deadline: Deadline,
    ) -> (Vec<f64>, usize, usize) {
        let total = queries.len();
        let (sender, receiver) = flume::bounded(total.max(1));
        for item in queries.iter().map(|q| q.vector.clone()).enumerate() {
            let _ = sender.send(item);
        }
        drop(sender);

        let workers = self.config.concurrency.min(total.max(1));
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let receiver = receiver.clone();
            let backend = Arc::clone(&self.backend);
            let options = options.clone();
            let collection = collection.to_string();
            let limit = self.config.limit;
            handles.push(tokio::spawn(async move {
                let mut latencies = Vec::new();
                let mut errors = 0usize;
                let mut attempted = 0usize;
                loop {
                    if deadline.expired() {
                        break;
                    }
                    match receiver.recv_async().await {
                        Ok((index, vector)) => {
                            attempted += 1;
                            match timed_search(&*backend, &collection, &vector, limit, &options)
                                .await
                            {
                                Ok(ms) => latencies.push(ms),
                                Err(error) => {
                                    errors += 1;
                                    tracing::debug!(
                                        collection,
                                        query = index,
                                        error = %error,
                                        "query failed"
                                    );
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }
                (latencies, errors, attempted)
            }));
        }
        drop(receiver);

        let mut latencies = Vec::with_capacity(total);
        let mut error_count = 0usize;
        let mut attempted = 0usize;
        for handle in handles {
            match handle.await {
                Ok((mut local, errors, tried)) => {
                    latencies.append(&mut local);
                    error_count += errors;
                    attempted += tried;
                }
                Err(error) => tracing::error!(%error, "measurement worker panicked"),
            }
        }
        (latencies, error_count, attempted)
    }
}
