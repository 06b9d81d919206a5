//! Engine configuration.
//!
//! Immutable value structs constructed once at process start and passed by
//! value into each component; no global configuration state lives inside
//! the engine. Defaults mirror the reference deployment (batch size 50,
//! three retries on a 2 s backoff base, result limit 10, oversampling grid
//! 2x through 10x).

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::backend::{BinaryEncoding, CollectionSpec, Distance, QuantizationSpec};
use crate::error::{Error, Result};

// ============================================================================
// Upload configuration
// ============================================================================

/// Knobs for [`BatchUploader`](crate::upload::BatchUploader).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Points per upsert request. Must be >= 1.
    pub batch_size: usize,
    /// Retry transient batch failures.
    pub retry_enabled: bool,
    /// Retries per batch after the first attempt.
    pub max_retries: u32,
    /// Base delay for the first retry, doubled on each further retry.
    pub backoff_base_ms: u64,
    /// Upper bound on any single backoff delay.
    pub backoff_max_ms: u64,
    /// Randomize backoff delays to avoid synchronized retries.
    pub jitter: bool,
    /// Raise an error when zero batches succeed instead of reporting a
    /// fully-failed summary.
    pub strict: bool,
    /// Worker tasks submitting batches. 1 = sequential.
    pub concurrency: usize,
    /// Overall time budget for one upload run.
    pub max_runtime: Option<Duration>,
    /// Write vectors under this named slot instead of the default one.
    pub vector_name: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry_enabled: false,
            max_retries: 3,
            backoff_base_ms: 2000,
            backoff_max_ms: 30_000,
            jitter: false,
            strict: false,
            concurrency: 1,
            max_runtime: None,
            vector_name: None,
        }
    }
}

impl UploadConfig {
    /// Preset for flaky backends: retries on, jittered backoff.
    pub fn resilient() -> Self {
        Self {
            retry_enabled: true,
            jitter: true,
            ..Self::default()
        }
    }

    // ------------------------------------------------------------------------
    // Builder methods
    // ------------------------------------------------------------------------

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_retry(mut self, enabled: bool) -> Self {
        self.retry_enabled = enabled;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }

    pub fn with_backoff_max_ms(mut self, ms: u64) -> Self {
        self.backoff_max_ms = ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn with_max_runtime(mut self, budget: Duration) -> Self {
        self.max_runtime = Some(budget);
        self
    }

    pub fn with_vector_name(mut self, name: impl Into<String>) -> Self {
        self.vector_name = Some(name.into());
        self
    }

    /// Check invariants before a run.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 1 {
            return Err(Error::config("batch_size must be >= 1"));
        }
        if self.concurrency < 1 {
            return Err(Error::config("concurrency must be >= 1"));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(Error::config(format!(
                "backoff_max_ms ({}) must be >= backoff_base_ms ({})",
                self.backoff_max_ms, self.backoff_base_ms
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Benchmark configuration
// ============================================================================

/// Knobs shared by [`LatencyRunner`](crate::bench::LatencyRunner) and the
/// components orchestrating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Results requested per search. Must be >= 1.
    pub limit: usize,
    /// Throwaway searches issued before timing starts. 0 disables warmup.
    pub warmup_count: u32,
    /// Oversampling factor used for with-rescoring comparison passes.
    pub rescore_oversampling: f64,
    /// Default factor grid for oversampling sweeps.
    pub oversampling_factors: Vec<f64>,
    /// Worker tasks issuing queries. 1 = sequential.
    pub concurrency: usize,
    /// Overall time budget for one measurement run.
    pub max_runtime: Option<Duration>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            warmup_count: 1,
            rescore_oversampling: 3.0,
            oversampling_factors: vec![2.0, 3.0, 5.0, 8.0, 10.0],
            concurrency: 1,
            max_runtime: None,
        }
    }
}

impl BenchmarkConfig {
    // ------------------------------------------------------------------------
    // Builder methods
    // ------------------------------------------------------------------------

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_warmup_count(mut self, count: u32) -> Self {
        self.warmup_count = count;
        self
    }

    pub fn with_rescore_oversampling(mut self, factor: f64) -> Self {
        self.rescore_oversampling = factor;
        self
    }

    pub fn with_oversampling_factors(mut self, factors: Vec<f64>) -> Self {
        self.oversampling_factors = factors;
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers;
        self
    }

    pub fn with_max_runtime(mut self, budget: Duration) -> Self {
        self.max_runtime = Some(budget);
        self
    }

    /// Check invariants before a run.
    pub fn validate(&self) -> Result<()> {
        if self.limit < 1 {
            return Err(Error::config("limit must be >= 1"));
        }
        if self.concurrency < 1 {
            return Err(Error::config("concurrency must be >= 1"));
        }
        if !(self.rescore_oversampling > 0.0) || !self.rescore_oversampling.is_finite() {
            return Err(Error::config("rescore_oversampling must be a positive number"));
        }
        if self.oversampling_factors.is_empty() {
            return Err(Error::config("oversampling_factors must not be empty"));
        }
        for &factor in &self.oversampling_factors {
            if !(factor > 0.0) || !factor.is_finite() {
                return Err(Error::config(format!(
                    "oversampling factor {} must be a positive number",
                    factor
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Quantization method descriptors
// ============================================================================

/// A named quantization configuration with the documented expectations for
/// its speed and compression gains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationMethod {
    pub name: String,
    pub spec: QuantizationSpec,
    /// Vendor-documented speedup, e.g. "40x". Informational.
    pub expected_speedup: String,
    /// Vendor-documented memory compression, e.g. "32x". Informational.
    pub expected_compression: String,
}

impl QuantizationMethod {
    /// int8 scalar quantization at the 0.99 quantile, held in RAM.
    pub fn scalar_int8() -> Self {
        Self {
            name: "scalar".to_string(),
            spec: QuantizationSpec::Scalar {
                quantile: 0.99,
                always_ram: true,
            },
            expected_speedup: "2x".to_string(),
            expected_compression: "4x".to_string(),
        }
    }

    /// One-bit binary quantization, held in RAM.
    pub fn binary() -> Self {
        Self {
            name: "binary".to_string(),
            spec: QuantizationSpec::Binary {
                encoding: BinaryEncoding::OneBit,
                always_ram: true,
            },
            expected_speedup: "40x".to_string(),
            expected_compression: "32x".to_string(),
        }
    }

    /// Two-bit binary quantization, held in RAM.
    pub fn binary_2bit() -> Self {
        Self {
            name: "binary_2bit".to_string(),
            spec: QuantizationSpec::Binary {
                encoding: BinaryEncoding::TwoBits,
                always_ram: true,
            },
            expected_speedup: "20x".to_string(),
            expected_compression: "16x".to_string(),
        }
    }

    /// Every method the comparison workflow exercises by default.
    pub fn all() -> Vec<Self> {
        vec![Self::scalar_int8(), Self::binary(), Self::binary_2bit()]
    }

    /// Collection layout for a quantized copy of a dataset.
    pub fn collection_spec(&self, vector_size: usize, distance: Distance) -> CollectionSpec {
        CollectionSpec::new(vector_size, distance).with_quantization(self.spec.clone())
    }
}

// ============================================================================
// Run deadline
// ============================================================================

/// Expiry instant for one engine run, computed at run start from the
/// config's `max_runtime`. `None` budget means the run is unbounded.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// Expire `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + budget),
        }
    }

    /// Start-of-run conversion from an optional budget.
    pub fn start(budget: Option<Duration>) -> Self {
        match budget {
            Some(budget) => Self::after(budget),
            None => Self::none(),
        }
    }

    /// True once the budget is used up. No new work should start after this.
    pub fn expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }
}
