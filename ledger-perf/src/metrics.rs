//! Metrics collection and statistics

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Latencies above this are clamped (microseconds)
const MAX_LATENCY_US: u64 = 60_000_000;

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(1, MAX_LATENCY_US, 3).expect("constant histogram bounds")
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Outcome of a single request
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// Submitted and accepted; latency of the final submission
    Passed(Duration),
    Failed(String),
    TimedOut,
    /// Record of another kind; not sent
    Skipped,
}

/// Per-tester collector, shared by that tester's worker threads
pub struct MetricsCollector {
    pub passed: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub skipped: AtomicU64,
    /// Latency histogram (microseconds)
    latency_histogram: Mutex<Histogram<u64>>,
    /// Start time (epoch millis)
    start_time_ms: AtomicU64,
    /// End time (epoch millis)
    end_time_ms: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            passed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            latency_histogram: Mutex::new(new_histogram()),
            start_time_ms: AtomicU64::new(0),
            end_time_ms: AtomicU64::new(0),
        }
    }

    pub fn mark_start(&self) {
        self.start_time_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn mark_end(&self) {
        self.end_time_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        match outcome {
            RequestOutcome::Passed(latency) => {
                self.passed.fetch_add(1, Ordering::Relaxed);
                let latency_us = (latency.as_micros() as u64).clamp(1, MAX_LATENCY_US);
                if let Err(e) = self.latency_histogram.lock().record(latency_us) {
                    warn!(error = %e, "Failed to record latency");
                }
            }
            RequestOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::TimedOut => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
            }
            RequestOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Snapshot of everything recorded so far
    pub fn report(&self) -> TesterReport {
        TesterReport {
            passed: self.passed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            timed_out: self.timed_out.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            start_ms: self.start_time_ms.load(Ordering::SeqCst),
            finish_ms: self.end_time_ms.load(Ordering::SeqCst),
            latency: self.latency_histogram.lock().clone(),
        }
    }
}

/// Result of one tester (one client)
#[derive(Debug, Clone)]
pub struct TesterReport {
    pub passed: u64,
    /// Failed requests, timeouts excluded
    pub failed: u64,
    pub timed_out: u64,
    pub skipped: u64,
    pub start_ms: u64,
    pub finish_ms: u64,
    pub latency: Histogram<u64>,
}

impl TesterReport {
    pub fn elapsed_ms(&self) -> u64 {
        self.finish_ms.saturating_sub(self.start_ms)
    }
}

#[derive(Debug)]
struct AggregateState {
    clients: u64,
    failed_clients: u64,
    passed: u64,
    failed: u64,
    timed_out: u64,
    skipped: u64,
    start_ms: Option<u64>,
    finish_ms: Option<u64>,
    fastest_ms: Option<u64>,
    slowest_ms: Option<u64>,
    latency: Histogram<u64>,
}

/// Cross-client reduction: counts are summed, start/finish and the
/// fastest/slowest elapsed times are min/max-reduced under one lock.
pub struct Aggregate {
    state: Mutex<AggregateState>,
}

impl Default for Aggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregateState {
                clients: 0,
                failed_clients: 0,
                passed: 0,
                failed: 0,
                timed_out: 0,
                skipped: 0,
                start_ms: None,
                finish_ms: None,
                fastest_ms: None,
                slowest_ms: None,
                latency: new_histogram(),
            }),
        }
    }

    pub fn absorb(&self, report: &TesterReport) {
        let elapsed = report.elapsed_ms();
        let mut state = self.state.lock();

        state.clients += 1;
        state.passed += report.passed;
        state.failed += report.failed;
        state.timed_out += report.timed_out;
        state.skipped += report.skipped;
        state.start_ms = Some(
            state
                .start_ms
                .map_or(report.start_ms, |s| s.min(report.start_ms)),
        );
        state.finish_ms = Some(
            state
                .finish_ms
                .map_or(report.finish_ms, |f| f.max(report.finish_ms)),
        );
        state.fastest_ms = Some(state.fastest_ms.map_or(elapsed, |f| f.min(elapsed)));
        state.slowest_ms = Some(state.slowest_ms.map_or(elapsed, |s| s.max(elapsed)));

        if let Err(e) = state.latency.add(&report.latency) {
            warn!(error = %e, "Failed to merge latency histogram");
        }
    }

    /// Count a client that produced no report
    pub fn record_failed_client(&self) {
        self.state.lock().failed_clients += 1;
    }

    pub fn summary(&self) -> RunSummary {
        let state = self.state.lock();
        let start_ms = state.start_ms.unwrap_or(0);
        let finish_ms = state.finish_ms.unwrap_or(start_ms);

        RunSummary {
            clients: state.clients,
            failed_clients: state.failed_clients,
            passed: state.passed,
            failed: state.failed,
            timed_out: state.timed_out,
            skipped: state.skipped,
            start_ms,
            finish_ms,
            fastest_ms: state.fastest_ms.unwrap_or(0),
            slowest_ms: state.slowest_ms.unwrap_or(0),
            latency: LatencyStats::from_histogram(&state.latency),
        }
    }
}

/// Latency statistics
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p90_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

impl LatencyStats {
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        Self {
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.50),
            p90_us: hist.value_at_quantile(0.90),
            p95_us: hist.value_at_quantile(0.95),
            p99_us: hist.value_at_quantile(0.99),
        }
    }
}

/// Summary across all clients of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Clients that completed and were absorbed
    pub clients: u64,
    /// Clients that failed before reporting anything
    pub failed_clients: u64,
    pub passed: u64,
    /// Failed requests, timeouts excluded; see [`RunSummary::total_failed`]
    pub failed: u64,
    pub timed_out: u64,
    /// Records of another kind, neither passed nor failed
    pub skipped: u64,
    pub start_ms: u64,
    pub finish_ms: u64,
    pub fastest_ms: u64,
    pub slowest_ms: u64,
    pub latency: LatencyStats,
}

impl RunSummary {
    pub fn total_failed(&self) -> u64 {
        self.failed + self.timed_out
    }

    pub fn total_requests(&self) -> u64 {
        self.passed + self.total_failed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.finish_ms.saturating_sub(self.start_ms)
    }

    pub fn transactions_per_client(&self) -> f64 {
        if self.clients == 0 {
            return 0.0;
        }
        self.total_requests() as f64 / self.clients as f64
    }

    /// Wall-clock seconds per transaction over the whole run
    pub fn average_transaction_secs(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        self.elapsed_ms() as f64 / 1000.0 / total as f64
    }

    /// Requested transactions (passed and failed) per second, truncated
    pub fn transactions_per_second(&self) -> u64 {
        let elapsed_ms = self.elapsed_ms();
        if elapsed_ms == 0 {
            return 0;
        }
        (self.total_requests() as f64 / (elapsed_ms as f64 / 1000.0)) as u64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        (self.passed as f64 / total as f64) * 100.0
    }
}
