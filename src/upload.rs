//! Batch upload with bounded retry and partial-failure isolation.
//!
//! The dataset is partitioned into contiguous fixed-size batches and point
//! ids are assigned from dataset position, so re-running an upload against
//! the same collection overwrites the same points instead of duplicating
//! them. Each batch runs through a small state machine: transient failures
//! retry on a capped exponential backoff while permanent failures and
//! exhausted retries mark the batch failed and the run moves on. One failed
//! batch never aborts the others.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{DataPoint, Payload, VectorBackend};
use crate::config::{Deadline, UploadConfig};
use crate::error::{BackendError, Error, Result};

// ============================================================================
// Outcome types
// ============================================================================

/// Terminal record for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub batch_index: usize,
    /// Submissions attempted for this batch, at most `max_retries + 1`.
    pub attempts: u32,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BackendError>,
}

/// Whole-run summary. `succeeded_items + failed_items == total_items`
/// always holds; batches never started before a deadline count as failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub collection: String,
    pub total_items: usize,
    pub succeeded_items: usize,
    pub failed_items: usize,
    pub outcomes: Vec<UploadOutcome>,
    /// True when a deadline stopped the run before every batch was started.
    pub incomplete: bool,
}

impl UploadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed_items == 0 && !self.incomplete
    }
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "uploaded {}/{} items to '{}' in {} batches ({} failed{})",
            self.succeeded_items,
            self.total_items,
            self.collection,
            self.outcomes.len(),
            self.failed_items,
            if self.incomplete { ", incomplete" } else { "" }
        )
    }
}

// ============================================================================
// Batch state machine
// ============================================================================

/// Retry progress for a single batch. `Attempting.attempt` counts the
/// submission about to run, starting at 1.
#[derive(Debug)]
enum BatchState {
    Pending,
    Attempting { attempt: u32 },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, error: BackendError },
}

/// Delay before the retry that follows `attempt` failed submissions:
/// `backoff_base_ms * 2^(attempt - 1)`, capped at `backoff_max_ms`. Jitter,
/// when enabled, scales the capped delay by a uniform factor in [0.5, 1.5).
fn backoff_delay(config: &UploadConfig, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let raw = config.backoff_base_ms.saturating_mul(1u64 << shift);
    let capped = raw.min(config.backoff_max_ms);
    let ms = if config.jitter {
        let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
        (capped as f64 * factor).round() as u64
    } else {
        capped
    };
    Duration::from_millis(ms)
}

/// Drive one batch to a terminal state.
async fn run_batch<B: VectorBackend + ?Sized>(
    backend: &B,
    config: &UploadConfig,
    collection: &str,
    batch_index: usize,
    points: &[DataPoint],
) -> UploadOutcome {
    let mut state = BatchState::Pending;
    loop {
        state = match state {
            BatchState::Pending => BatchState::Attempting { attempt: 1 },
            BatchState::Attempting { attempt } => {
                let result = backend
                    .upsert(collection, points, config.vector_name.as_deref())
                    .await;
                match result {
                    Ok(()) => BatchState::Succeeded { attempts: attempt },
                    Err(error)
                        if error.is_transient()
                            && config.retry_enabled
                            && attempt <= config.max_retries =>
                    {
                        let delay = backoff_delay(config, attempt);
                        tracing::warn!(
                            collection,
                            batch = batch_index,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "transient batch failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        BatchState::Attempting { attempt: attempt + 1 }
                    }
                    Err(error) => BatchState::Failed {
                        attempts: attempt,
                        error,
                    },
                }
            }
            BatchState::Succeeded { attempts } => {
                tracing::debug!(collection, batch = batch_index, attempts, "batch uploaded");
                return UploadOutcome {
                    batch_index,
                    attempts,
                    succeeded: true,
                    error: None,
                };
            }
            BatchState::Failed { attempts, error } => {
                tracing::warn!(
                    collection,
                    batch = batch_index,
                    attempts,
                    error = %error,
                    "batch failed"
                );
                return UploadOutcome {
                    batch_index,
                    attempts,
                    succeeded: false,
                    error: Some(error),
                };
            }
        };
    }
}

/// Items in batch `index` when `total` items are split into `batch_size`
/// chunks.
fn batch_len(total: usize, batch_size: usize, index: usize) -> usize {
    batch_size.min(total.saturating_sub(index * batch_size))
}

// ============================================================================
// Uploader
// ============================================================================

/// Uploads a dataset with precomputed embeddings in retry-safe batches.
pub struct BatchUploader<B> {
    backend: Arc<B>,
    config: UploadConfig,
}

impl<B: VectorBackend + 'static> BatchUploader<B> {
    pub fn new(backend: Arc<B>, config: UploadConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload `payloads` zipped with `vectors` into `collection`.
    ///
    /// Partial failure is reported, not raised: the summary carries one
    /// outcome per started batch. Errors are reserved for invalid input and
    /// for strict-mode runs in which every batch failed.
    #[tracing::instrument(skip(self, payloads, vectors))]
    pub async fn upload(
        &self,
        collection: &str,
        payloads: Vec<Payload>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<UploadSummary> {
        self.config.validate()?;
        if payloads.len() != vectors.len() {
            return Err(Error::config(format!(
                "dataset size ({}) does not match vector count ({})",
                payloads.len(),
                vectors.len()
            )));
        }

        let total_items = payloads.len();
        let deadline = Deadline::start(self.config.max_runtime);

        // Ids from dataset position keep repeat uploads idempotent.
        let points: Vec<DataPoint> = payloads
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(id, (payload, vector))| DataPoint::new(id as u64, vector).with_payload(payload))
            .collect();

        let mut batches: Vec<Vec<DataPoint>> = Vec::new();
        let mut rest = points;
        while rest.len() > self.config.batch_size {
            let tail = rest.split_off(self.config.batch_size);
            batches.push(rest);
            rest = tail;
        }
        if !rest.is_empty() {
            batches.push(rest);
        }
        let total_batches = batches.len();

        tracing::info!(
            collection,
            items = total_items,
            batches = total_batches,
            concurrency = self.config.concurrency,
            "starting upload"
        );

        let outcomes = if self.config.concurrency > 1 {
            self.run_pooled(collection, batches, deadline).await
        } else {
            self.run_sequential(collection, batches, deadline).await
        };

        let incomplete = outcomes.len() < total_batches;
        let succeeded_items: usize = outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| batch_len(total_items, self.config.batch_size, o.batch_index))
            .sum();
        let failed_items = total_items - succeeded_items;
        let succeeded_batches = outcomes.iter().filter(|o| o.succeeded).count();

        if self.config.strict && succeeded_batches == 0 && !outcomes.is_empty() {
            return Err(Error::AllBatchesFailed {
                collection: collection.to_string(),
                batches: total_batches,
            });
        }

        let summary = UploadSummary {
            collection: collection.to_string(),
            total_items,
            succeeded_items,
            failed_items,
            outcomes,
            incomplete,
        };
        tracing::info!(collection, %summary, "upload finished");
        Ok(summary)
    }

    async fn run_sequential(
        &self,
        collection: &str,
        batches: Vec<Vec<DataPoint>>,
        deadline: Deadline,
    ) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(batches.len());
        for (index, batch) in batches.into_iter().enumerate() {
            if deadline.expired() {
                tracing::warn!(collection, next_batch = index, "deadline expired, stopping upload");
                break;
            }
            outcomes.push(run_batch(&*self.backend, &self.config, collection, index, &batch).await);
        }
        outcomes
    }

    /// Fixed-size worker pool draining a bounded MPMC queue of batches.
    /// A worker sleeping in backoff never blocks the others.
    async fn run_pooled(
        &self,
        collection: &str,
        batches: Vec<Vec<DataPoint>>,
        deadline: Deadline,
    ) -> Vec<UploadOutcome> {
        let total = batches.len();
        let (sender, receiver) = flume::bounded(total.max(1));
        for item in batches.into_iter().enumerate() {
            // Capacity equals queue length, so this never blocks.
            let _ = sender.send(item);
        }
        drop(sender);

        let workers = self.config.concurrency.min(total.max(1));
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let receiver = receiver.clone();
            let backend = Arc::clone(&self.backend);
            let config = self.config.clone();
            let collection = collection.to_string();
            handles.push(tokio::spawn(async move {
                let mut local = Vec::new();
                loop {
                    if deadline.expired() {
                        break;
                    }
                    match receiver.recv_async().await {
                        Ok((index, batch)) => {
                            local.push(
                                run_batch(&*backend, &config, &collection, index, &batch).await,
                            );
                        }
                        Err(_) => break,
                    }
                }
                local
            }));
        }
        drop(receiver);

        let mut outcomes = Vec::with_capacity(total);
        for handle in handles {
            match handle.await {
                Ok(mut local) => outcomes.append(&mut local),
                Err(error) => tracing::error!(%error, "upload worker panicked"),
            }
        }
        outcomes.sort_by_key(|o| o.batch_index);
        outcomes
    }
}
