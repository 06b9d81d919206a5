//! Quantization benchmarking engine for vector-search backends.
//!
//! The engine ingests a dataset in retry-safe batches, times pre-vectorized
//! queries against baseline and quantized collections, and reports latency
//! percentiles, relative speedups, and accuracy retention:
//! - **[`BatchUploader`]**: batched upsert with bounded retry, capped
//!   exponential backoff, and partial-failure isolation
//! - **[`LatencyRunner`]**: per-query wall-clock timing with interpolated
//!   percentile aggregation
//! - **[`QuantizationComparator`]**: baseline vs quantized methods, with
//!   and without rescoring, as relative p95 speedups
//! - **[`OversamplingTuner`]**: oversampling-factor sweep with top-k
//!   accuracy retention against a full-precision baseline
//!
//! All components speak to the backend through the [`VectorBackend`]
//! contract. [`QdrantBackend`] implements it over REST;
//! [`MemoryBackend`] is a deterministic in-memory double for tests.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use quantbench::{
//!     BatchUploader, BenchmarkConfig, CollectionSpec, Distance, LatencyRunner,
//!     MemoryBackend, Payload, Query, SearchOptions, UploadConfig, VectorBackend,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! backend
//!     .create_collection("docs", &CollectionSpec::new(128, Distance::Cosine))
//!     .await?;
//!
//! let payloads = vec![Payload::new(); 100];
//! let vectors: Vec<Vec<f32>> = (0..100).map(|_| vec![0.0; 128]).collect();
//! let uploader = BatchUploader::new(Arc::clone(&backend), UploadConfig::default());
//! let summary = uploader.upload("docs", payloads, vectors).await?;
//! println!("{summary}");
//!
//! let queries = vec![Query::new("example", vec![0.0; 128])];
//! let runner = LatencyRunner::new(backend, BenchmarkConfig::default());
//! let result = runner
//!     .measure("docs", &queries, &SearchOptions::default(), "plain")
//!     .await?;
//! println!("{}", result.metrics);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bench;
pub mod config;
pub mod error;
pub mod report;
pub mod upload;

pub use backend::{
    BinaryEncoding, CollectionInfo, CollectionSpec, DataPoint, Distance, MemoryBackend, Payload,
    QdrantBackend, QdrantConfig, QuantizationSpec, ScoredPoint, SearchOptions, VectorBackend,
};
pub use bench::{
    BenchmarkResult, ComparisonReport, LatencyMetrics, LatencyRunner, MethodReport,
    OversamplingTrial, OversamplingTuner, Query, QuantizationCandidate, QuantizationComparator,
    TuningReport,
};
pub use config::{BenchmarkConfig, Deadline, QuantizationMethod, UploadConfig};
pub use error::{BackendError, BackendErrorKind, Error, Result};
pub use upload::{BatchUploader, UploadOutcome, UploadSummary};
