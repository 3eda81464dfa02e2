//! Multi-client orchestration

use crate::ledger::LedgerClient;
use crate::metrics::{Aggregate, RunSummary};
use crate::report::{self, OutputFormat};
use crate::tester::{PerformanceTester, TesterOptions, Workload};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// Run-level settings
#[derive(Clone)]
pub struct RunnerOptions {
    pub workload: Workload,
    /// Number of simulated clients, each a full tester on its own thread
    pub clients: usize,
    pub tester: TesterOptions,
    pub results_dir: PathBuf,
    pub output: OutputFormat,
}

impl RunnerOptions {
    /// Pick the workload from the mutually exclusive add/get flags
    pub fn workload_from_flags(add: bool, get: bool, requests: u64) -> Result<Workload> {
        match (add, get) {
            (true, false) => Ok(Workload::Add { requests }),
            (false, true) => Ok(Workload::Get),
            (true, true) => bail!("Adding and getting cannot be requested at the same time"),
            (false, false) => {
                bail!("Cannot determine any kind of request for testing; pass --add or --get")
            }
        }
    }
}

/// Outcome of a whole run
pub struct RunOutcome {
    pub summary: RunSummary,
    pub result_path: PathBuf,
}

pub struct PerformanceTestRunner {
    client: Arc<dyn LedgerClient>,
    options: RunnerOptions,
}

impl PerformanceTestRunner {
    pub fn new(client: Arc<dyn LedgerClient>, options: RunnerOptions) -> Self {
        Self { client, options }
    }

    fn clients(&self) -> usize {
        self.options.clients.max(1)
    }

    fn create_testers(&self) -> Vec<PerformanceTester> {
        let clients = self.clients();
        (0..clients)
            .map(|i| {
                let mut options = self.options.tester.clone();
                // Fixed names would collide between concurrent clients
                if clients > 1 {
                    options.pool_name = options.pool_name.map(|n| format!("{}_{}", n, i));
                    options.wallet_name = options.wallet_name.map(|n| format!("{}_{}", n, i));
                }
                PerformanceTester::new(self.client.clone(), options, self.options.workload)
            })
            .collect()
    }

    /// Run every client, aggregate their reports and write the result file.
    ///
    /// Fails only when no client produced a report.
    pub fn run(&self) -> Result<RunOutcome> {
        let testers = self.create_testers();
        let aggregate = Aggregate::new();

        info!(
            clients = testers.len(),
            workload = ?self.options.workload,
            kind = %self.options.tester.kind,
            "Starting performance test"
        );

        let results: Vec<Result<_>> = if testers.len() == 1 {
            vec![testers[0].run()]
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = testers
                    .iter()
                    .enumerate()
                    .map(|(i, tester)| {
                        thread::Builder::new()
                            .name(format!("client-{}", i))
                            .spawn_scoped(scope, move || tester.run())
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| match handle {
                        Ok(handle) => handle
                            .join()
                            .unwrap_or_else(|_| Err(anyhow::anyhow!("Client thread panicked"))),
                        Err(e) => Err(anyhow::anyhow!("Failed to spawn client thread: {}", e)),
                    })
                    .collect()
            })
        };

        let mut completed = 0usize;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(report) => {
                    aggregate.absorb(&report);
                    completed += 1;
                }
                Err(e) => {
                    aggregate.record_failed_client();
                    error!(client = i, error = %format!("{:#}", e), "Client failed");
                }
            }
        }

        if completed == 0 {
            bail!("No client completed the test");
        }

        let summary = aggregate.summary();
        let result_path =
            report::write_result(&self.options.results_dir, &summary, self.options.output)?;
        println!("{}", report::render(&summary, self.options.output));
        report::print_status_line(&summary);

        Ok(RunOutcome {
            summary,
            result_path,
        })
    }
}
