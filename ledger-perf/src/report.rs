//! Report generation and output formatting

use crate::metrics::RunSummary;
use crate::util::{random_string, UPPERCASE_AND_DIGITS};
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Result output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl OutputFormat {
    fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

fn ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// `Hh:Mm:Ss` with truncated components
pub fn format_duration(total_ms: u64) -> String {
    let total = total_ms / 1000;
    format!("{}h:{}m:{}s", total / 3600, total / 60 % 60, total % 60)
}

pub fn render(summary: &RunSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => text_report(summary),
        OutputFormat::Json => json_report(summary),
        OutputFormat::Csv => format!("{}\n{}", csv_header(), csv_row(summary)),
    }
}

pub fn text_report(summary: &RunSummary) -> String {
    let mut out = String::new();
    let lines = [
        format!(
            " -----------  Total time to run the test: {}  -----------",
            format_duration(summary.elapsed_ms())
        ),
        format!(" Clients = {}", summary.clients),
        format!(" Failed clients = {}", summary.failed_clients),
        format!(" Fastest client = {:.3}s", secs(summary.fastest_ms)),
        format!(" Slowest client = {:.3}s", secs(summary.slowest_ms)),
        format!(" Transaction per client = {:.2}", summary.transactions_per_client()),
        format!(" Total requested transactions = {}", summary.total_requests()),
        format!(" Total passed transactions = {}", summary.passed),
        format!(
            " Total failed transactions = {} ({} timed out)",
            summary.total_failed(),
            summary.timed_out
        ),
        format!(" Total skipped requests = {}", summary.skipped),
        format!(
            " Average time of a transaction = {:.6}s",
            summary.average_transaction_secs()
        ),
        format!(
            " Estimated transactions per second = {}",
            summary.transactions_per_second()
        ),
        format!(
            " Latency (ms) = min {:.2} | mean {:.2} | p50 {:.2} | p90 {:.2} | p95 {:.2} | p99 {:.2} | max {:.2}",
            ms(summary.latency.min_us),
            summary.latency.mean_us / 1000.0,
            ms(summary.latency.p50_us),
            ms(summary.latency.p90_us),
            ms(summary.latency.p95_us),
            ms(summary.latency.p99_us),
            ms(summary.latency.max_us),
        ),
    ];
    for line in lines {
        let _ = writeln!(out, "\n{}", line);
    }
    out
}

pub fn json_report(summary: &RunSummary) -> String {
    serde_json::json!({
        "clients": summary.clients,
        "failed_clients": summary.failed_clients,
        "elapsed_ms": summary.elapsed_ms(),
        "fastest_client_ms": summary.fastest_ms,
        "slowest_client_ms": summary.slowest_ms,
        "transactions_per_client": summary.transactions_per_client(),
        "total_requests": summary.total_requests(),
        "passed": summary.passed,
        "failed": summary.total_failed(),
        "timed_out": summary.timed_out,
        "skipped": summary.skipped,
        "average_transaction_secs": summary.average_transaction_secs(),
        "transactions_per_second": summary.transactions_per_second(),
        "success_rate": summary.success_rate(),
        "latency": {
            "min_ms": ms(summary.latency.min_us),
            "max_ms": ms(summary.latency.max_us),
            "mean_ms": summary.latency.mean_us / 1000.0,
            "p50_ms": ms(summary.latency.p50_us),
            "p90_ms": ms(summary.latency.p90_us),
            "p95_ms": ms(summary.latency.p95_us),
            "p99_ms": ms(summary.latency.p99_us),
        }
    })
    .to_string()
}

pub fn csv_header() -> &'static str {
    "timestamp,clients,failed_clients,elapsed_ms,fastest_client_ms,slowest_client_ms,total_requests,passed,failed,timed_out,skipped,tps,latency_min_ms,latency_mean_ms,latency_p50_ms,latency_p90_ms,latency_p95_ms,latency_p99_ms,latency_max_ms"
}

pub fn csv_row(summary: &RunSummary) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
        chrono::Utc::now().to_rfc3339(),
        summary.clients,
        summary.failed_clients,
        summary.elapsed_ms(),
        summary.fastest_ms,
        summary.slowest_ms,
        summary.total_requests(),
        summary.passed,
        summary.total_failed(),
        summary.timed_out,
        summary.skipped,
        summary.transactions_per_second(),
        ms(summary.latency.min_us),
        summary.latency.mean_us / 1000.0,
        ms(summary.latency.p50_us),
        ms(summary.latency.p90_us),
        ms(summary.latency.p95_us),
        ms(summary.latency.p99_us),
        ms(summary.latency.max_us),
    )
}

/// Write the report to `<results_dir>/result_<dd-mm-YYYY_HH-MM-SS>_<tag>.<ext>`;
/// the random tag keeps runs finishing in the same second apart
pub fn write_result(
    results_dir: &Path,
    summary: &RunSummary,
    format: OutputFormat,
) -> Result<PathBuf> {
    fs::create_dir_all(results_dir)
        .with_context(|| format!("Failed to create {}", results_dir.display()))?;

    let stamp = chrono::Local::now().format("%d-%m-%Y_%H-%M-%S");
    let tag = random_string("", "", 6, UPPERCASE_AND_DIGITS);
    let path = results_dir.join(format!("result_{}_{}.{}", stamp, tag, format.extension()));
    fs::write(&path, render(summary, format))
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), "Result written");
    Ok(path)
}

/// One-line verdict
pub fn print_status_line(summary: &RunSummary) {
    let rate = summary.success_rate();
    let status_emoji = if rate > 99.0 {
        "✅"
    } else if rate > 95.0 {
        "⚠️"
    } else {
        "❌"
    };

    info!(
        "{} TPS: {} | Success Rate: {:.2}% | P99 Latency: {:.2}ms",
        status_emoji,
        summary.transactions_per_second(),
        rate,
        ms(summary.latency.p99_us)
    );
}
