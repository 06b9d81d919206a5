//! Latency statistics and recall helpers.
//!
//! Percentiles use linear interpolation between order statistics: for a
//! fraction `p` over `n` ascending samples the rank is `p * (n - 1)` and
//! the value is interpolated between the two bracketing order statistics.
//! This matches the reference toolchain the reports are compared against,
//! so the formula is part of the output contract.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Aggregated latency distribution for one measurement run.
///
/// `count` is the number of successful queries in the sample; queries that
/// errored are tallied in `error_count` and excluded from every statistic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p995_ms: f64,
    pub p999_ms: f64,
    pub error_count: usize,
}

impl LatencyMetrics {
    /// Aggregate a latency sample (milliseconds). Empty samples produce
    /// zeroed statistics with only `error_count` set.
    pub fn from_latencies(latencies: &[f64], error_count: usize) -> Self {
        if latencies.is_empty() {
            return Self {
                error_count,
                ..Self::default()
            };
        }

        let mut sorted = latencies.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let avg_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;

        Self {
            count: sorted.len(),
            avg_ms,
            p50_ms: percentile(&sorted, 0.50),
            p90_ms: percentile(&sorted, 0.90),
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
            p995_ms: percentile(&sorted, 0.995),
            p999_ms: percentile(&sorted, 0.999),
            error_count,
        }
    }

    /// True when the sample recorded no successful query.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for LatencyMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "count={} avg={:.2}ms p50={:.2}ms p90={:.2}ms p95={:.2}ms p99={:.2}ms \
             p99.5={:.2}ms p99.9={:.2}ms errors={}",
            self.count,
            self.avg_ms,
            self.p50_ms,
            self.p90_ms,
            self.p95_ms,
            self.p99_ms,
            self.p995_ms,
            self.p999_ms,
            self.error_count
        )
    }
}

/// Interpolated percentile over an ascending-sorted sample.
///
/// `p` is a fraction in [0, 1]. Rank `r = p * (n - 1)`; the result is
/// `sorted[floor(r)]` moved toward `sorted[ceil(r)]` by the fractional part
/// of `r`. A single sample is its own value at every percentile.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Fraction of the baseline's top-`limit` ids reproduced by the candidate's
/// top-`limit` ids: `|intersection| / limit`.
pub fn top_k_overlap(baseline: &[u64], candidate: &[u64], limit: usize) -> f64 {
    if limit == 0 {
        return 0.0;
    }
    let baseline_ids: HashSet<u64> = baseline.iter().take(limit).copied().collect();
    if baseline_ids.is_empty() {
        return 0.0;
    }
    let overlap = candidate
        .iter()
        .take(limit)
        .filter(|id| baseline_ids.contains(id))
        .count();
    overlap as f64 / limit as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_exact_order_statistic() {
        // rank 0.5 * 4 = 2.0 lands exactly on the middle sample
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert!((percentile(&sorted, 0.50) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10.0, 20.0];
        assert!((percentile(&sorted, 0.50) - 15.0).abs() < 1e-9);

        // rank 0.9 * 4 = 3.6 -> 40 + 0.6 * (50 - 40) = 46
        let sorted = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert!((percentile(&sorted, 0.90) - 46.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.95) - 47.0).abs() < 1e-9);
        assert!((percentile(&sorted, 0.999) - 49.96).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_single_sample() {
        let sorted = [42.5];
        for p in [0.0, 0.5, 0.9, 0.99, 1.0] {
            assert!((percentile(&sorted, p) - 42.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_percentile_bounds() {
        let sorted = [1.0, 2.0, 3.0];
        assert!((percentile(&sorted, 0.0) - 1.0).abs() < 1e-9);
        assert!((percentile(&sorted, 1.0) - 3.0).abs() < 1e-9);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_metrics_from_known_sample() {
        let metrics = LatencyMetrics::from_latencies(&[10.0, 20.0, 30.0, 40.0, 50.0], 0);
        assert_eq!(metrics.count, 5);
        assert!((metrics.avg_ms - 30.0).abs() < 1e-9);
        assert!((metrics.p50_ms - 30.0).abs() < 1e-9);
        assert!((metrics.p90_ms - 46.0).abs() < 1e-9);
        assert_eq!(metrics.error_count, 0);
    }

    #[test]
    fn test_metrics_sorts_unordered_input() {
        let shuffled = [30.0, 10.0, 50.0, 20.0, 40.0];
        let ordered = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(
            LatencyMetrics::from_latencies(&shuffled, 0),
            LatencyMetrics::from_latencies(&ordered, 0)
        );
    }

    #[test]
    fn test_metrics_percentiles_monotone() {
        let sample = [3.2, 18.0, 4.4, 91.5, 7.3, 12.8, 5.0, 44.1, 6.6, 2.9];
        let m = LatencyMetrics::from_latencies(&sample, 0);
        assert!(m.p50_ms <= m.p90_ms);
        assert!(m.p90_ms <= m.p95_ms);
        assert!(m.p95_ms <= m.p99_ms);
        assert!(m.p99_ms <= m.p995_ms);
        assert!(m.p995_ms <= m.p999_ms);
    }

    #[test]
    fn test_metrics_single_value() {
        let m = LatencyMetrics::from_latencies(&[7.0], 0);
        assert_eq!(m.count, 1);
        for value in [m.avg_ms, m.p50_ms, m.p90_ms, m.p95_ms, m.p99_ms, m.p995_ms, m.p999_ms] {
            assert!((value - 7.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_metrics_empty_sample() {
        let m = LatencyMetrics::from_latencies(&[], 4);
        assert!(m.is_empty());
        assert_eq!(m.count, 0);
        assert_eq!(m.error_count, 4);
        assert_eq!(m.p95_ms, 0.0);
    }

    #[test]
    fn test_metrics_display() {
        let m = LatencyMetrics::from_latencies(&[10.0, 20.0], 1);
        let rendered = m.to_string();
        assert!(rendered.contains("count=2"));
        assert!(rendered.contains("p95="));
        assert!(rendered.contains("errors=1"));
    }

    #[test]
    fn test_top_k_overlap() {
        let baseline = [1, 2, 3, 4, 5];
        assert!((top_k_overlap(&baseline, &[1, 2, 3, 4, 5], 5) - 1.0).abs() < 1e-9);
        assert!((top_k_overlap(&baseline, &[1, 2, 9, 8, 7], 5) - 0.4).abs() < 1e-9);
        assert!((top_k_overlap(&baseline, &[9, 8, 7, 6, 0], 5) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_top_k_overlap_respects_limit() {
        // Only the first `limit` entries of each side participate.
        let baseline = [1, 2, 3, 4];
        let candidate = [3, 1, 4, 2];
        assert!((top_k_overlap(&baseline, &candidate, 2) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_top_k_overlap_empty_baseline() {
        assert_eq!(top_k_overlap(&[], &[1, 2], 5), 0.0);
        assert_eq!(top_k_overlap(&[1], &[1], 0), 0.0);
    }
}
