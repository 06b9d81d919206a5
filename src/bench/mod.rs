//! Measurement components built on the backend contract.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`LatencyRunner`] | Times a query set and aggregates percentiles |
//! | [`QuantizationComparator`] | Baseline vs quantized methods, with/without rescore |
//! | [`OversamplingTuner`] | Oversampling sweep with optional accuracy retention |
//! | [`metrics`] | Shared percentile and overlap math |
//!
//! All three components share one backend handle (`Arc<B>`) and take their
//! knobs from [`BenchmarkConfig`](crate::config::BenchmarkConfig).

pub mod compare;
pub mod metrics;
pub mod runner;
pub mod tune;

pub use compare::{ComparisonReport, MethodReport, QuantizationCandidate, QuantizationComparator};
pub use metrics::{percentile, top_k_overlap, LatencyMetrics};
pub use runner::{BenchmarkResult, LatencyRunner, Query};
pub use tune::{OversamplingTrial, OversamplingTuner, TuningReport};
