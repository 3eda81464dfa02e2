//! One client's full test cycle
//!
//! Set-up (pool config, pool, wallet, submitter DID) and clean-up run on a
//! runtime private to the tester's thread; the workload itself fans out to
//! worker threads with [`run_workers`].

use crate::ledger::{
    LedgerClient, PoolHandle, RequestBlob, WalletHandle, POOL_LEDGER_CONFIG_ALREADY_EXISTS,
    WALLET_ALREADY_EXISTS,
};
use crate::metrics::{MetricsCollector, TesterReport};
use crate::partition::{divide_work, round_robin};
use crate::request_info::{
    collect_info_files, info_file_path, kind_dir, read_records, write_records, RequestInfo,
};
use crate::request_log::RequestLog;
use crate::requests::{RequestKind, Session};
use crate::util::{print_error, print_header, print_step, print_warning, random_name};
use crate::worker::{isolated_runtime, run_workers};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What a tester sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Write `requests` new entries and record them
    Add { requests: u64 },
    /// Read back every recorded entry
    Get,
}

/// Settings shared by every tester of a run
#[derive(Clone)]
pub struct TesterOptions {
    pub kind: RequestKind,
    /// Worker threads per tester; zero is treated as one
    pub threads: usize,
    pub info_dir: PathBuf,
    pub genesis_txn: String,
    pub seed: String,
    /// Fixed pool name; random when `None`
    pub pool_name: Option<String>,
    /// Fixed wallet name; random when `None`
    pub wallet_name: Option<String>,
    pub request_log: Option<Arc<RequestLog>>,
}

/// Ledger resources this tester has created so far
#[derive(Debug, Default)]
struct Resources {
    pool_config: bool,
    pool: Option<PoolHandle>,
    wallet_created: bool,
    wallet: Option<WalletHandle>,
}

pub struct PerformanceTester {
    client: Arc<dyn LedgerClient>,
    options: TesterOptions,
    workload: Workload,
    pool_name: String,
    wallet_name: String,
}

impl PerformanceTester {
    pub fn new(client: Arc<dyn LedgerClient>, options: TesterOptions, workload: Workload) -> Self {
        let pool_name = options
            .pool_name
            .clone()
            .unwrap_or_else(|| random_name("pool"));
        let wallet_name = options
            .wallet_name
            .clone()
            .unwrap_or_else(|| random_name("wallet"));

        Self {
            client,
            options,
            workload,
            pool_name,
            wallet_name,
        }
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn wallet_name(&self) -> &str {
        &self.wallet_name
    }

    fn threads(&self) -> usize {
        self.options.threads.max(1)
    }

    /// Run set-up, the workload and clean-up on the calling thread.
    ///
    /// Clean-up runs even when set-up or the workload failed. A workload
    /// failure is logged and the requests counted so far are still reported;
    /// only failures before the first request is sent return `Err`.
    pub fn run(&self) -> Result<TesterReport> {
        let records = match self.workload {
            // Read runs fail fast when there is nothing to read
            Workload::Get => {
                let files = collect_info_files(&self.options.info_dir, self.options.kind)?;
                Some(read_records(&files)?)
            }
            // Write runs fail fast when their records could not be stored
            Workload::Add { .. } => {
                let dir = kind_dir(&self.options.info_dir, self.options.kind);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
                None
            }
        };

        let runtime = isolated_runtime()?;
        let mut resources = Resources::default();
        let metrics = MetricsCollector::new();

        let setup = runtime.block_on(self.setup(&mut resources));
        if let Ok(session) = &setup {
            let workload = match (self.workload, records) {
                (Workload::Add { requests }, _) => self.run_add(session, &metrics, requests),
                (Workload::Get, records) => {
                    self.run_get(session, &metrics, records.unwrap_or_default())
                }
            };
            if let Err(e) = workload {
                print_error("The workload did not finish cleanly, reporting what was counted");
                error!(pool = %self.pool_name, error = %format!("{:#}", e), "Workload failed");
            }
        }

        runtime.block_on(self.cleanup(&resources));
        if let Some(log) = &self.options.request_log {
            log.flush();
        }

        if let Err(e) = setup {
            return Err(e);
        }
        print_header("\n\t========  Finished");
        Ok(metrics.report())
    }

    async fn setup(&self, resources: &mut Resources) -> Result<Session> {
        print_step("Pre-test setup");
        info!(
            pool = %self.pool_name,
            wallet = %self.wallet_name,
            kind = %self.options.kind,
            threads = self.threads(),
            "Setting up tester"
        );

        match self
            .client
            .create_pool_config(&self.pool_name, &self.options.genesis_txn)
            .await
        {
            Ok(()) => print_header("\n\tCreated ledger config from genesis txn file"),
            Err(e) if e.code() == Some(POOL_LEDGER_CONFIG_ALREADY_EXISTS) => {
                print_warning("The ledger already exists, moving on...")
            }
            Err(e) => return Err(e).context("Failed to create pool ledger config"),
        }
        resources.pool_config = true;

        let pool = self
            .client
            .open_pool(&self.pool_name)
            .await
            .context("Failed to open pool ledger")?;
        resources.pool = Some(pool);
        print_header(&format!("\n\tOpened pool ledger {}", pool.0));

        match self
            .client
            .create_wallet(&self.pool_name, &self.wallet_name)
            .await
        {
            Ok(()) => print_header("\n\t======== Created wallet"),
            Err(e) if e.code() == Some(WALLET_ALREADY_EXISTS) => print_warning(&format!(
                "Wallet '{}' already exists.  Skipping wallet creation...",
                self.wallet_name
            )),
            Err(e) => return Err(e).context("Failed to create wallet"),
        }
        resources.wallet_created = true;

        let wallet = self
            .client
            .open_wallet(&self.wallet_name)
            .await
            .context("Failed to open wallet")?;
        resources.wallet = Some(wallet);
        print_header("\n\t======== Opened wallet");

        let (submitter, _) = self
            .client
            .create_and_store_did(wallet, Some(&self.options.seed))
            .await
            .context("Failed to create submitter DID")?;
        print_header(&format!("\n\tCreated DID to use when sending requests {}", submitter));

        Ok(Session {
            client: self.client.clone(),
            pool,
            wallet,
            submitter,
            request_log: self.options.request_log.clone(),
        })
    }

    fn run_add(&self, session: &Session, metrics: &MetricsCollector, requests: u64) -> Result<()> {
        let kind = self.options.kind;
        let shares = divide_work(requests, self.threads());
        let records: Mutex<Vec<RequestInfo>> = Mutex::new(Vec::new());
        let records_ref = &records;

        print_header(&format!("\n\tSending {} {} requests...", requests, kind));
        metrics.mark_start();
        let result = run_workers("add", shares, move |_, share| async move {
            for _ in 0..share {
                let (outcome, record) = session.send_write(kind).await;
                metrics.record(&outcome);
                if let Some(record) = record {
                    records_ref.lock().push(record);
                }
            }
        });
        metrics.mark_end();

        // Whatever made it onto the ledger is worth keeping, even after a
        // worker failure
        let records = records.into_inner();
        let path = info_file_path(&self.options.info_dir, kind, self.threads());
        write_records(&path, &records)?;
        info!(path = %path.display(), records = records.len(), "Request info stored");

        result
    }

    fn run_get(
        &self,
        session: &Session,
        metrics: &MetricsCollector,
        records: Vec<RequestInfo>,
    ) -> Result<()> {
        let kind = self.options.kind;
        print_header(&format!("\n\tBuilding {} get {} requests...", records.len(), kind));

        // Requests are built up front so the timed window covers submissions only
        let lanes = round_robin(records, self.threads());
        let prepared: Vec<Mutex<Vec<RequestBlob>>> =
            lanes.iter().map(|_| Mutex::new(Vec::new())).collect();
        let prepared_ref = &prepared;
        let built = run_workers("build", lanes, move |index, lane| async move {
            let mut requests = Vec::with_capacity(lane.len());
            for record in &lane {
                match session.prepare_read(kind, record).await {
                    Ok(request) => requests.push(request),
                    Err(outcome) => metrics.record(&outcome),
                }
            }
            *prepared_ref[index].lock() = requests;
        });
        let lanes: Vec<Vec<RequestBlob>> = prepared.into_iter().map(Mutex::into_inner).collect();

        let total: usize = lanes.iter().map(Vec::len).sum();
        print_header(&format!("\n\tSubmitting {} get {} requests...", total, kind));
        metrics.mark_start();
        let submitted = run_workers("get", lanes, move |_, lane| async move {
            for request in &lane {
                let outcome = session.submit_read(kind, request).await;
                metrics.record(&outcome);
            }
        });
        metrics.mark_end();

        built.and(submitted)
    }

    /// Close and delete whatever `setup` created; every failure is logged
    /// and skipped
    async fn cleanup(&self, resources: &Resources) {
        print_step("Post-test clean up");
        if let Some(wallet) = resources.wallet {
            print_header("\n\tClose wallet");
            if let Err(e) = self.client.close_wallet(wallet).await {
                print_error("Cannot close wallet. Skip closing wallet...");
                warn!(error = %e, "Close wallet failed");
            }
        }

        if resources.wallet_created {
            print_header("\n\tDelete wallet");
            if let Err(e) = self.client.delete_wallet(&self.wallet_name).await {
                print_error("Cannot delete wallet. Skip deleting wallet...");
                warn!(error = %e, "Delete wallet failed");
            }
        }

        if let Some(pool) = resources.pool {
            print_header("\n\tClose pool");
            if let Err(e) = self.client.close_pool(pool).await {
                print_error("Cannot close pool. Skip closing pool...");
                warn!(error = %e, "Close pool failed");
            }
        }

        if resources.pool_config {
            print_header("\n\tDelete pool");
            if let Err(e) = self.client.delete_pool_config(&self.pool_name).await {
                print_error("Cannot delete pool. Skip deleting pool...");
                warn!(error = %e, "Delete pool failed");
            }
        }
    }
}
