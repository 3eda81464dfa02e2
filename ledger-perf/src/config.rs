//! Command line and configuration file

use crate::ledger::SimulationConfig;
use crate::report::OutputFormat;
use crate::requests::RequestKind;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Seed of the trustee identity used to write
pub const DEFAULT_ADD_SEED: &str = "000000000000000000000000Trustee1";
/// Seed of the steward identity used to read
pub const DEFAULT_GET_SEED: &str = "000000000000000000000000Steward1";
pub const DEFAULT_GENESIS_TXN: &str = "/var/lib/indy/sandbox/pool/pool_transaction_sandbox_genesis";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Ledger performance test harness
#[derive(Parser, Debug, Clone)]
#[command(name = "ledger-perf")]
#[command(about = "Throughput and latency tests against a ledger pool", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Debug logging: show every successful response, not only failures
    #[arg(short = 'l', long, global = true)]
    pub log: bool,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub ledger: LedgerArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// How to reach the client library
#[derive(Args, Debug, Clone)]
pub struct LedgerArgs {
    /// Client-library gateway URL
    #[arg(short = 'u', long, global = true)]
    pub gateway_url: Option<String>,

    /// Path to the genesis transaction file
    #[arg(long = "genesis", global = true)]
    pub genesis_txn: Option<String>,

    /// Seed of the submitter DID
    #[arg(short = 'i', long, global = true)]
    pub seed: Option<String>,

    /// Gateway request timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Run against the in-process simulated ledger instead of a gateway
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Simulated submission latency in milliseconds
    #[arg(long, global = true, default_value = "2")]
    pub sim_latency_ms: u64,

    /// Simulated rejection probability (0.0 - 1.0)
    #[arg(long, global = true, default_value = "0.0")]
    pub sim_failure_rate: f64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run several clients of the add or get test and aggregate their results
    Run {
        /// Adding request performance testing
        #[arg(short = 'a', long = "add", conflicts_with = "get")]
        add: bool,

        /// Getting request performance testing
        #[arg(short = 'g', long = "get")]
        get: bool,

        /// Number of clients to create
        #[arg(short = 'c', long, default_value = "1")]
        clients: usize,

        #[command(flatten)]
        workload: WorkloadArgs,
    },

    /// Write requests to the ledger and store their info
    Add {
        #[command(flatten)]
        workload: WorkloadArgs,
    },

    /// Read back requests stored by a previous add run
    Get {
        #[command(flatten)]
        workload: WorkloadArgs,
    },

    /// Delete pool and wallet directories left in the client home
    Cleanup {
        /// Client-library home directory (default ~/.indy_client)
        #[arg(long)]
        client_home: Option<PathBuf>,

        /// Pool name to delete
        #[arg(long)]
        pool_name: Option<String>,

        /// Wallet name to delete
        #[arg(long)]
        wallet_name: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WorkloadArgs {
    /// Number of transactions to submit (ignored by get)
    #[arg(short = 'n', long, default_value = "100")]
    pub txns: u64,

    /// Worker threads per client
    #[arg(short = 's', long = "threads", default_value = "1")]
    pub threads: usize,

    /// Kind of request to send
    #[arg(short = 'k', long, value_enum, default_value = "nym")]
    pub kind: RequestKind,

    /// Directory holding request info files
    #[arg(short = 'd', long)]
    pub info_dir: Option<PathBuf>,

    /// Directory for result files
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// Result format
    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Log every submitted request to this file
    #[arg(long)]
    pub request_log: Option<PathBuf>,
}

/// Settings read from `--config`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub gateway_url: String,
    pub timeout: u64,
    pub keep_alive: bool,
    pub pool_genesis_file: String,
    pub add_seed: String,
    pub get_seed: String,
    pub pool_name: Option<String>,
    pub wallet_name: Option<String>,
    pub info_dir: PathBuf,
    pub results_dir: PathBuf,
    pub client_home: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:9702".to_string(),
            timeout: 30,
            keep_alive: true,
            pool_genesis_file: DEFAULT_GENESIS_TXN.to_string(),
            add_seed: DEFAULT_ADD_SEED.to_string(),
            get_seed: DEFAULT_GET_SEED.to_string(),
            pool_name: None,
            wallet_name: None,
            info_dir: PathBuf::from("request_info"),
            results_dir: PathBuf::from("results"),
            client_home: None,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Backend selected for a run
#[derive(Debug, Clone)]
pub enum Backend {
    Gateway {
        url: String,
        timeout: u64,
        keep_alive: bool,
    },
    Simulated(SimulationConfig),
}

/// Effective settings: command line over config file over defaults
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend: Backend,
    pub genesis_txn: String,
    /// Explicit seed; otherwise the per-mode seed below applies
    pub seed: Option<String>,
    pub add_seed: String,
    pub get_seed: String,
    pub pool_name: Option<String>,
    pub wallet_name: Option<String>,
    pub info_dir: PathBuf,
    pub results_dir: PathBuf,
    pub client_home: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(ledger: &LedgerArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let backend = if ledger.simulate {
            if !(0.0..=1.0).contains(&ledger.sim_failure_rate) {
                return Err(ConfigError::Invalid(format!(
                    "sim-failure-rate must be within 0.0..=1.0, got {}",
                    ledger.sim_failure_rate
                )));
            }
            Backend::Simulated(SimulationConfig {
                latency_ms: ledger.sim_latency_ms,
                failure_rate: ledger.sim_failure_rate,
            })
        } else {
            Backend::Gateway {
                url: ledger.gateway_url.clone().unwrap_or(file.gateway_url),
                timeout: ledger.timeout.unwrap_or(file.timeout),
                keep_alive: file.keep_alive,
            }
        };

        Ok(Self {
            backend,
            genesis_txn: ledger.genesis_txn.clone().unwrap_or(file.pool_genesis_file),
            seed: ledger.seed.clone(),
            add_seed: file.add_seed,
            get_seed: file.get_seed,
            pool_name: file.pool_name,
            wallet_name: file.wallet_name,
            info_dir: file.info_dir,
            results_dir: file.results_dir,
            client_home: file.client_home,
        })
    }

    /// Seed for writing (`add`) or reading (`get`) runs
    pub fn seed_for(&self, adding: bool) -> String {
        match &self.seed {
            Some(seed) => seed.clone(),
            None if adding => self.add_seed.clone(),
            None => self.get_seed.clone(),
        }
    }

    pub fn print_config(&self, workload: &WorkloadArgs, clients: usize) {
        info!("Configuration:");
        match &self.backend {
            Backend::Gateway { url, timeout, .. } => {
                info!("  Gateway URL:      {}", url);
                info!("  Timeout:          {}s", timeout);
            }
            Backend::Simulated(sim) => {
                info!("  Backend:          simulated ledger");
                info!("  Latency:          {}ms", sim.latency_ms);
                info!("  Failure Rate:     {:.2}", sim.failure_rate);
            }
        }
        info!("  Genesis Txn:      {}", self.genesis_txn);
        info!("  Kind:             {}", workload.kind);
        info!("  Clients:          {}", clients);
        info!("  Threads/Client:   {}", workload.threads.max(1));
        info!("  Txns/Client:      {}", workload.txns);
        info!(
            "  Info Dir:         {}",
            workload.info_dir.as_ref().unwrap_or(&self.info_dir).display()
        );
        info!("");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "ledger-perf", "run", "-a", "-c", "3", "-n", "500", "-s", "4", "-k", "schema",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                add,
                get,
                clients,
                workload,
            } => {
                assert!(add);
                assert!(!get);
                assert_eq!(clients, 3);
                assert_eq!(workload.txns, 500);
                assert_eq!(workload.threads, 4);
                assert_eq!(workload.kind, RequestKind::Schema);
                assert_eq!(workload.output, OutputFormat::Text);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_add_and_get_conflict() {
        assert!(Cli::try_parse_from(["ledger-perf", "run", "-a", "-g"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ledger-perf", "get", "--simulate", "-l", "-i", "seed", "-k", "claim",
        ])
        .unwrap();
        assert!(cli.log);
        assert!(cli.ledger.simulate);
        assert_eq!(cli.ledger.seed.as_deref(), Some("seed"));
    }

    #[test]
    fn test_file_config_defaults_and_overrides() {
        let file: FileConfig = toml::from_str(
            r#"
            gateway_url = "http://10.0.0.5:9702"
            pool_name = "perf_pool"
            "#,
        )
        .unwrap();
        assert_eq!(file.timeout, 30);
        assert_eq!(file.pool_name.as_deref(), Some("perf_pool"));

        let cli = Cli::try_parse_from(["ledger-perf", "add", "--timeout", "5"]).unwrap();
        let settings = Settings::resolve(&cli.ledger, file).unwrap();
        match settings.backend {
            Backend::Gateway { ref url, timeout, .. } => {
                assert_eq!(url, "http://10.0.0.5:9702");
                assert_eq!(timeout, 5);
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(settings.seed_for(true), DEFAULT_ADD_SEED);
        assert_eq!(settings.seed_for(false), DEFAULT_GET_SEED);
    }

    #[test]
    fn test_invalid_failure_rate() {
        let cli = Cli::try_parse_from([
            "ledger-perf", "add", "--simulate", "--sim-failure-rate", "1.5",
        ])
        .unwrap();
        assert!(Settings::resolve(&cli.ledger, FileConfig::default()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = FileConfig::load(Path::new("/nonexistent/ledger-perf.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
