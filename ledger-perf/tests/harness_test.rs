//! End-to-end runs against the in-process ledger
//!
//! Each test drives full testers (set-up, workload, clean-up) and checks the
//! counts, the stored request info and that every handle was released.

use async_trait::async_trait;
use ledger_perf::config::{DEFAULT_ADD_SEED, DEFAULT_GET_SEED};
use ledger_perf::ledger::{
    Did, LedgerClient, LedgerError, LedgerResult, PoolHandle, RequestBlob, RequestParams,
    SimulatedLedger, SimulationConfig, Verkey, WalletHandle,
};
use ledger_perf::report::OutputFormat;
use ledger_perf::request_info::{collect_info_files, read_records};
use ledger_perf::request_log::RequestLog;
use ledger_perf::requests::RequestKind;
use ledger_perf::runner::{PerformanceTestRunner, RunnerOptions};
use ledger_perf::tester::{PerformanceTester, TesterOptions, Workload};
use ledger_perf::worker::isolated_runtime;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Initialize tracing for tests
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn ledger(failure_rate: f64) -> Arc<SimulatedLedger> {
    Arc::new(SimulatedLedger::new(SimulationConfig {
        latency_ms: 0,
        failure_rate,
    }))
}

fn options(kind: RequestKind, threads: usize, info_dir: &Path, seed: &str) -> TesterOptions {
    TesterOptions {
        kind,
        threads,
        info_dir: info_dir.to_path_buf(),
        genesis_txn: "genesis.txn".to_string(),
        seed: seed.to_string(),
        pool_name: None,
        wallet_name: None,
        request_log: None,
    }
}

/// Simulated ledger with slow GET builds or failing DID creation
struct Scripted {
    inner: Arc<SimulatedLedger>,
    get_build_delay: Duration,
    fail_did_creation: bool,
}

impl Scripted {
    fn new(inner: Arc<SimulatedLedger>) -> Self {
        Self {
            inner,
            get_build_delay: Duration::ZERO,
            fail_did_creation: false,
        }
    }
}

#[async_trait]
impl LedgerClient for Scripted {
    async fn create_pool_config(&self, pool_name: &str, genesis_txn: &str) -> LedgerResult<()> {
        self.inner.create_pool_config(pool_name, genesis_txn).await
    }

    async fn open_pool(&self, pool_name: &str) -> LedgerResult<PoolHandle> {
        self.inner.open_pool(pool_name).await
    }

    async fn close_pool(&self, pool: PoolHandle) -> LedgerResult<()> {
        self.inner.close_pool(pool).await
    }

    async fn delete_pool_config(&self, pool_name: &str) -> LedgerResult<()> {
        self.inner.delete_pool_config(pool_name).await
    }

    async fn create_wallet(&self, pool_name: &str, wallet_name: &str) -> LedgerResult<()> {
        self.inner.create_wallet(pool_name, wallet_name).await
    }

    async fn open_wallet(&self, wallet_name: &str) -> LedgerResult<WalletHandle> {
        self.inner.open_wallet(wallet_name).await
    }

    async fn close_wallet(&self, wallet: WalletHandle) -> LedgerResult<()> {
        self.inner.close_wallet(wallet).await
    }

    async fn delete_wallet(&self, wallet_name: &str) -> LedgerResult<()> {
        self.inner.delete_wallet(wallet_name).await
    }

    async fn create_and_store_did(
        &self,
        wallet: WalletHandle,
        seed: Option<&str>,
    ) -> LedgerResult<(Did, Verkey)> {
        if self.fail_did_creation {
            return Err(LedgerError::Library {
                code: 113,
                message: "Invalid seed".to_string(),
            });
        }
        self.inner.create_and_store_did(wallet, seed).await
    }

    async fn build_request(
        &self,
        submitter: &Did,
        params: &RequestParams,
    ) -> LedgerResult<RequestBlob> {
        if !params.is_write() {
            tokio::time::sleep(self.get_build_delay).await;
        }
        self.inner.build_request(submitter, params).await
    }

    async fn sign_and_submit(
        &self,
        pool: PoolHandle,
        wallet: WalletHandle,
        submitter: &Did,
        request: &RequestBlob,
    ) -> LedgerResult<String> {
        self.inner.sign_and_submit(pool, wallet, submitter, request).await
    }

    async fn submit(&self, pool: PoolHandle, request: &RequestBlob) -> LedgerResult<String> {
        self.inner.submit(pool, request).await
    }
}

#[test]
fn test_add_then_get_every_kind() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(0.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();

    for kind in [
        RequestKind::Nym,
        RequestKind::Schema,
        RequestKind::Attribute,
        RequestKind::Claim,
    ] {
        let add = PerformanceTester::new(
            client.clone(),
            options(kind, 3, dir.path(), DEFAULT_ADD_SEED),
            Workload::Add { requests: 10 },
        );
        let report = add.run().unwrap();
        assert_eq!(report.passed, 10, "{} add", kind);
        assert_eq!(report.failed + report.timed_out, 0);

        let files = collect_info_files(dir.path(), kind).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(read_records(&files).unwrap().len(), 10);

        let get = PerformanceTester::new(
            client.clone(),
            options(kind, 4, dir.path(), DEFAULT_GET_SEED),
            Workload::Get,
        );
        let report = get.run().unwrap();
        assert_eq!(report.passed, 10, "{} get", kind);
        assert_eq!(report.failed, 0);
    }

    assert_eq!(ledger.open_pool_count(), 0);
    assert_eq!(ledger.open_wallet_count(), 0);
}

#[test]
fn test_rejected_requests_are_counted_and_not_recorded() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(1.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();

    let tester = PerformanceTester::new(
        client,
        options(RequestKind::Nym, 2, dir.path(), DEFAULT_ADD_SEED),
        Workload::Add { requests: 7 },
    );
    let report = tester.run().unwrap();

    assert_eq!(report.passed, 0);
    assert_eq!(report.failed, 7);
    assert_eq!(ledger.written_count(), 0);

    // The info file is still written, just empty
    let files = collect_info_files(dir.path(), RequestKind::Nym).unwrap();
    assert!(read_records(&files).unwrap().is_empty());
    assert_eq!(ledger.open_pool_count(), 0);
}

#[test]
fn test_get_without_info_files_fails_before_setup() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(0.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();

    let tester = PerformanceTester::new(
        client,
        options(RequestKind::Schema, 1, dir.path(), DEFAULT_GET_SEED),
        Workload::Get,
    );
    assert!(tester.run().is_err());
    assert_eq!(ledger.open_pool_count(), 0);
}

#[test]
fn test_get_skips_records_of_another_kind() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let client: Arc<dyn LedgerClient> = ledger(0.0);

    PerformanceTester::new(
        client.clone(),
        options(RequestKind::Nym, 1, dir.path(), DEFAULT_ADD_SEED),
        Workload::Add { requests: 3 },
    )
    .run()
    .unwrap();

    // Misfiled records: nym entries inside the schema directory
    let nym_files = collect_info_files(dir.path(), RequestKind::Nym).unwrap();
    let schema_dir = dir.path().join("schema");
    std::fs::create_dir_all(&schema_dir).unwrap();
    std::fs::copy(&nym_files[0], schema_dir.join("misfiled.txt")).unwrap();

    let report = PerformanceTester::new(
        client,
        options(RequestKind::Schema, 2, dir.path(), DEFAULT_GET_SEED),
        Workload::Get,
    )
    .run()
    .unwrap();
    assert_eq!(report.passed, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 3);
}

#[test]
fn test_fixed_names_are_reused() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(0.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();

    let mut fixed = options(RequestKind::Nym, 1, dir.path(), DEFAULT_ADD_SEED);
    fixed.pool_name = Some("perf_pool".to_string());
    fixed.wallet_name = Some("perf_wallet".to_string());

    for _ in 0..2 {
        let tester =
            PerformanceTester::new(client.clone(), fixed.clone(), Workload::Add { requests: 2 });
        assert_eq!(tester.pool_name(), "perf_pool");
        assert_eq!(tester.wallet_name(), "perf_wallet");
        assert_eq!(tester.run().unwrap().passed, 2);
    }
}

#[test]
fn test_runner_aggregates_clients() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(0.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();
    let log_path = dir.path().join("requests.log");
    let request_log = Arc::new(RequestLog::create(&log_path).unwrap());

    let mut tester = options(RequestKind::Nym, 2, &dir.path().join("info"), DEFAULT_ADD_SEED);
    tester.pool_name = Some("perf_pool".to_string());
    tester.request_log = Some(request_log.clone());

    let runner = PerformanceTestRunner::new(
        client.clone(),
        RunnerOptions {
            workload: Workload::Add { requests: 5 },
            clients: 3,
            tester: tester.clone(),
            results_dir: dir.path().join("results"),
            output: OutputFormat::Text,
        },
    );
    let outcome = runner.run().unwrap();

    assert_eq!(outcome.summary.clients, 3);
    assert_eq!(outcome.summary.passed, 15);
    assert_eq!(outcome.summary.total_requests(), 15);
    assert!(outcome.summary.fastest_ms <= outcome.summary.slowest_ms);
    assert!(outcome.result_path.exists());
    assert_eq!(ledger.written_count(), 15);
    assert_eq!(ledger.open_pool_count(), 0);
    assert_eq!(ledger.open_wallet_count(), 0);

    // One info file per client
    let files = collect_info_files(&dir.path().join("info"), RequestKind::Nym).unwrap();
    assert_eq!(files.len(), 3);

    request_log.flush();
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(log.matches("======== Status: Passed").count(), 15);

    // Every client reads every stored record
    tester.seed = DEFAULT_GET_SEED.to_string();
    tester.request_log = None;
    let outcome = PerformanceTestRunner::new(
        client,
        RunnerOptions {
            workload: Workload::Get,
            clients: 2,
            tester,
            results_dir: dir.path().join("results"),
            output: OutputFormat::Json,
        },
    )
    .run()
    .unwrap();
    assert_eq!(outcome.summary.passed, 30);
    assert_eq!(outcome.result_path.extension().unwrap(), "json");
}

#[test]
fn test_get_window_excludes_request_building() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(0.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();

    PerformanceTester::new(
        client,
        options(RequestKind::Nym, 1, dir.path(), DEFAULT_ADD_SEED),
        Workload::Add { requests: 4 },
    )
    .run()
    .unwrap();

    let slow_builds = Scripted {
        get_build_delay: Duration::from_millis(50),
        ..Scripted::new(ledger)
    };
    let report = PerformanceTester::new(
        Arc::new(slow_builds),
        options(RequestKind::Nym, 1, dir.path(), DEFAULT_GET_SEED),
        Workload::Get,
    )
    .run()
    .unwrap();

    assert_eq!(report.passed, 4);
    // Four builds take 200ms; the timed window must only cover submissions
    assert!(report.elapsed_ms() < 100, "elapsed {}ms", report.elapsed_ms());
}

#[test]
fn test_unusable_info_dir_fails_before_sending() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let not_a_dir = dir.path().join("not_a_dir");
    std::fs::write(&not_a_dir, "").unwrap();
    let ledger = ledger(0.0);
    let client: Arc<dyn LedgerClient> = ledger.clone();

    let tester = PerformanceTester::new(
        client,
        options(RequestKind::Nym, 2, &not_a_dir, DEFAULT_ADD_SEED),
        Workload::Add { requests: 5 },
    );
    assert!(tester.run().is_err());
    assert_eq!(ledger.written_count(), 0);
    assert_eq!(ledger.open_pool_count(), 0);
}

#[test]
fn test_setup_failure_releases_pool_and_wallet() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger(0.0);
    let failing = Scripted {
        fail_did_creation: true,
        ..Scripted::new(ledger.clone())
    };

    let mut fixed = options(RequestKind::Nym, 1, dir.path(), DEFAULT_ADD_SEED);
    fixed.pool_name = Some("setup_pool".to_string());
    fixed.wallet_name = Some("setup_wallet".to_string());

    let tester = PerformanceTester::new(Arc::new(failing), fixed, Workload::Add { requests: 3 });
    assert!(tester.run().is_err());

    assert_eq!(ledger.open_pool_count(), 0);
    assert_eq!(ledger.open_wallet_count(), 0);
    assert_eq!(ledger.written_count(), 0);

    // Config and wallet were deleted, so both names are free again
    let runtime = isolated_runtime().unwrap();
    runtime
        .block_on(ledger.create_pool_config("setup_pool", "genesis.txn"))
        .unwrap();
    runtime
        .block_on(ledger.create_wallet("setup_pool", "setup_wallet"))
        .unwrap();
}
