//! Result artifacts for downstream tooling.
//!
//! Comparison and sweep reports serialize to JSON, sweeps additionally to
//! CSV, and both render as fixed-width console tables. Everything here
//! consumes only the serializable report types; nothing reaches back into
//! the engine.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::bench::{BenchmarkResult, ComparisonReport, OversamplingTrial, TuningReport};

// ============================================================================
// File artifacts
// ============================================================================

pub fn save_comparison_json(report: &ComparisonReport, path: &Path) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(report).context("serializing comparison report")?;
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "comparison report saved");
    Ok(())
}

pub fn save_tuning_json(report: &TuningReport, path: &Path) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(report).context("serializing sweep report")?;
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "sweep report saved");
    Ok(())
}

/// One row per trial, columns matching [`OversamplingTrial::csv_header`].
pub fn save_tuning_csv(report: &TuningReport, path: &Path) -> anyhow::Result<()> {
    let mut body = String::new();
    body.push_str(OversamplingTrial::csv_header());
    body.push('\n');
    for trial in &report.trials {
        body.push_str(&trial.to_csv_row());
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = report.trials.len(), "sweep table saved");
    Ok(())
}

// ============================================================================
// Console tables
// ============================================================================

fn metrics_row(
    out: &mut String,
    method: &str,
    variant: &str,
    result: &BenchmarkResult,
    speedup: Option<f64>,
) {
    let speedup = speedup.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string());
    let _ = writeln!(
        out,
        "{:<16} {:<12} {:>7} {:>10.2} {:>10.2} {:>10.2} {:>9}",
        method,
        variant,
        result.metrics.count,
        result.metrics.avg_ms,
        result.metrics.p95_ms,
        result.metrics.p99_ms,
        speedup
    );
}

/// Render a comparison as a fixed-width table, baseline first.
pub fn comparison_table(report: &ComparisonReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Quantization Comparison ===");
    let _ = writeln!(
        out,
        "{:<16} {:<12} {:>7} {:>10} {:>10} {:>10} {:>9}",
        "method", "variant", "count", "avg(ms)", "p95(ms)", "p99(ms)", "speedup"
    );
    let _ = writeln!(out, "{}", "-".repeat(79));

    metrics_row(&mut out, "baseline", "-", &report.baseline, Some(1.0));
    for (method, entry) in &report.methods {
        if let Some(result) = &entry.no_rescore {
            metrics_row(&mut out, method, "no rescore", result, entry.speedup_no_rescore);
        }
        if let Some(result) = &entry.with_rescore {
            metrics_row(&mut out, method, "rescore", result, entry.speedup_with_rescore);
        }
        if let Some(error) = &entry.error {
            let _ = writeln!(out, "{:<16} {:<12} {}", method, "failed", error);
        }
        if let Some(anomaly) = &entry.anomaly {
            let _ = writeln!(out, "{:<16} {:<12} {}", method, "anomaly", anomaly);
        }
    }
    if report.incomplete {
        let _ = writeln!(out, "(incomplete: stopped before all runs finished)");
    }
    out
}

/// Render a sweep as a fixed-width table in trial order.
pub fn tuning_table(report: &TuningReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Oversampling Sweep: {} ===", report.collection);
    let _ = writeln!(
        out,
        "{:<8} {:>7} {:>10} {:>10} {:>10} {:>10} {:>7}",
        "factor", "count", "avg(ms)", "p95(ms)", "p99(ms)", "retention", "errors"
    );
    let _ = writeln!(out, "{}", "-".repeat(68));
    for trial in &report.trials {
        let retention = trial
            .accuracy_retention
            .map(|r| format!("{r:.4}"))
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<8} {:>7} {:>10.2} {:>10.2} {:>10.2} {:>10} {:>7}",
            trial.factor,
            trial.metrics.count,
            trial.metrics.avg_ms,
            trial.metrics.p95_ms,
            trial.metrics.p99_ms,
            retention,
            trial.metrics.error_count
        );
        if let Some(error) = &trial.error {
            let _ = writeln!(out, "{:<8} {}", "", error);
        }
    }
    if report.incomplete {
        let _ = writeln!(out, "(incomplete: stopped before all factors ran)");
    }
    out
}

pub fn print_comparison(report: &ComparisonReport) {
    print!("{}", comparison_table(report));
}

pub fn print_tuning(report: &TuningReport) {
    print!("{}", tuning_table(report));
}
