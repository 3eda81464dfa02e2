//! Ledger performance test harness
//!
//! Measures throughput and latency of a ledger pool by driving its client
//! library from many threads at once.
//!
//! # Usage
//!
//! ```bash
//! # Write 1000 NYM transactions from 4 clients with 8 threads each
//! ledger-perf run --add -c 4 -s 8 -n 1000 -k nym
//!
//! # Read back everything the add run recorded
//! ledger-perf run --get -c 4 -s 8 -k nym
//!
//! # Dry run against the in-process ledger
//! ledger-perf --simulate add -n 200 -s 4 -k schema
//!
//! # Remove pool and wallet directories left by an interrupted run
//! ledger-perf cleanup --pool-name perf_pool --wallet-name perf_wallet
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use ledger_perf::cleanup::{default_client_home, delete_pool_and_wallet};
use ledger_perf::config::{Backend, Cli, Command, FileConfig, Settings, WorkloadArgs};
use ledger_perf::ledger::{HttpLedgerClient, LedgerClient, SimulatedLedger};
use ledger_perf::request_log::RequestLog;
use ledger_perf::runner::{PerformanceTestRunner, RunnerOptions};
use ledger_perf::tester::{TesterOptions, Workload};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(if cli.log { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║          Ledger Performance Test Harness v0.1.0          ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("");

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&cli.ledger, file)?;

    match cli.command {
        Command::Run {
            add,
            get,
            clients,
            workload,
        } => {
            let kind = RunnerOptions::workload_from_flags(add, get, workload.txns)?;
            run(&settings, kind, clients, workload)
        }
        Command::Add { workload } => {
            let kind = Workload::Add {
                requests: workload.txns,
            };
            run(&settings, kind, 1, workload)
        }
        Command::Get { workload } => run(&settings, Workload::Get, 1, workload),
        Command::Cleanup {
            client_home,
            pool_name,
            wallet_name,
        } => {
            let client_home = client_home
                .or_else(|| settings.client_home.clone())
                .or_else(default_client_home)
                .context("Cannot determine the client home directory; pass --client-home")?;
            let pool_name = pool_name.or_else(|| settings.pool_name.clone());
            let wallet_name = wallet_name.or_else(|| settings.wallet_name.clone());
            delete_pool_and_wallet(&client_home, pool_name.as_deref(), wallet_name.as_deref())?;
            Ok(())
        }
    }
}

fn build_client(settings: &Settings) -> Result<Arc<dyn LedgerClient>> {
    Ok(match &settings.backend {
        Backend::Gateway {
            url,
            timeout,
            keep_alive,
        } => Arc::new(HttpLedgerClient::new(url.clone(), *timeout, *keep_alive)?),
        Backend::Simulated(sim) => Arc::new(SimulatedLedger::new(sim.clone())),
    })
}

fn run(settings: &Settings, workload: Workload, clients: usize, args: WorkloadArgs) -> Result<()> {
    settings.print_config(&args, clients);

    let client = build_client(settings)?;
    let request_log = match &args.request_log {
        Some(path) => Some(Arc::new(RequestLog::create(path)?)),
        None => None,
    };

    let options = RunnerOptions {
        workload,
        clients,
        tester: TesterOptions {
            kind: args.kind,
            threads: args.threads,
            info_dir: args.info_dir.unwrap_or_else(|| settings.info_dir.clone()),
            genesis_txn: settings.genesis_txn.clone(),
            seed: settings.seed_for(matches!(workload, Workload::Add { .. })),
            pool_name: settings.pool_name.clone(),
            wallet_name: settings.wallet_name.clone(),
            request_log,
        },
        results_dir: args.results_dir.unwrap_or_else(|| settings.results_dir.clone()),
        output: args.output,
    };

    let outcome = PerformanceTestRunner::new(client, options).run()?;
    info!(path = %outcome.result_path.display(), "Performance test finished");
    Ok(())
}
