//! In-process stand-in for the client library
//!
//! Used for dry runs and tests. It keeps just enough bookkeeping to behave
//! like the real library from the harness' point of view: handles must be
//! open, names must be unique, and reads only succeed for targets that an
//! earlier write created.

use super::{
    Did, LedgerClient, LedgerError, LedgerResult, PoolHandle, RequestBlob, RequestParams, Verkey,
    WalletHandle, POOL_LEDGER_CONFIG_ALREADY_EXISTS, WALLET_ALREADY_EXISTS,
};
use crate::util::random_string;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

const POOL_NOT_CREATED: i32 = 300;
const WALLET_NOT_FOUND: i32 = 204;
const INVALID_HANDLE: i32 = 110;
const INVALID_REQUEST: i32 = 113;
const LEDGER_NOT_FOUND: i32 = 309;
const SIMULATED_REJECT: i32 = 307;

const DID_CHARS: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Behaviour knobs for [`SimulatedLedger`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay applied to every submission
    pub latency_ms: u64,
    /// Probability in `[0, 1]` that a submission is rejected
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 2,
            failure_rate: 0.0,
        }
    }
}

/// Built request as handed back by [`SimulatedLedger::build_request`]
#[derive(Debug, Serialize, Deserialize)]
struct SimRequest {
    #[serde(rename = "reqId")]
    req_id: u64,
    identifier: Did,
    operation: RequestParams,
}

pub struct SimulatedLedger {
    config: SimulationConfig,
    pool_configs: DashSet<String>,
    wallets: DashSet<String>,
    open_pools: DashMap<i32, String>,
    open_wallets: DashMap<i32, String>,
    /// Ledger keys created by successful writes
    written: DashSet<String>,
    next_handle: AtomicI32,
    next_req_id: AtomicU64,
}

impl SimulatedLedger {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            pool_configs: DashSet::new(),
            wallets: DashSet::new(),
            open_pools: DashMap::new(),
            open_wallets: DashMap::new(),
            written: DashSet::new(),
            next_handle: AtomicI32::new(1),
            next_req_id: AtomicU64::new(1),
        }
    }

    /// Number of distinct ledger entries written so far
    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    pub fn open_pool_count(&self) -> usize {
        self.open_pools.len()
    }

    pub fn open_wallet_count(&self) -> usize {
        self.open_wallets.len()
    }

    fn handle(&self) -> i32 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn check_pool(&self, pool: PoolHandle) -> LedgerResult<()> {
        if self.open_pools.contains_key(&pool.0) {
            Ok(())
        } else {
            Err(library(INVALID_HANDLE, format!("Invalid pool handle {}", pool.0)))
        }
    }

    fn check_wallet(&self, wallet: WalletHandle) -> LedgerResult<()> {
        if self.open_wallets.contains_key(&wallet.0) {
            Ok(())
        } else {
            Err(library(INVALID_HANDLE, format!("Invalid wallet handle {}", wallet.0)))
        }
    }

    async fn delay_and_roll(&self) -> LedgerResult<()> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        let rate = self.config.failure_rate;
        if rate > 0.0 && rand::thread_rng().gen_bool(rate.min(1.0)) {
            return Err(library(SIMULATED_REJECT, "Request rejected by pool".to_string()));
        }
        Ok(())
    }

    fn parse(request: &RequestBlob) -> LedgerResult<SimRequest> {
        serde_json::from_str(&request.0)
            .map_err(|e| library(INVALID_REQUEST, format!("Malformed request: {}", e)))
    }

    fn reply(req: &SimRequest) -> String {
        json!({ "op": "REPLY", "result": { "reqId": req.req_id, "identifier": req.identifier } })
            .to_string()
    }
}

fn library(code: i32, message: String) -> LedgerError {
    LedgerError::Library { code, message }
}

fn schema_key(owner: &Did, data: &serde_json::Value) -> String {
    format!(
        "schema:{}:{}:{}",
        owner,
        data["name"].as_str().unwrap_or_default(),
        data["version"].as_str().unwrap_or_default()
    )
}

/// Ledger key a write creates, or a read looks up
fn ledger_key(submitter: &Did, params: &RequestParams) -> String {
    match params {
        RequestParams::Nym { target, .. } | RequestParams::GetNym { target } => {
            format!("nym:{}", target)
        }
        RequestParams::Schema { data } => schema_key(submitter, data),
        RequestParams::GetSchema { dest, data } => schema_key(dest, data),
        RequestParams::Attrib { target, raw } => {
            let name = raw
                .as_object()
                .and_then(|o| o.keys().next().cloned())
                .unwrap_or_default();
            format!("attrib:{}:{}", target, name)
        }
        RequestParams::GetAttrib { target, raw_name } => format!("attrib:{}:{}", target, raw_name),
        RequestParams::ClaimDef { seq_no, signature_type, .. } => {
            format!("claim:{}:{}:{}", submitter, seq_no, signature_type)
        }
        RequestParams::GetClaimDef { seq_no, signature_type, issuer } => {
            format!("claim:{}:{}:{}", issuer, seq_no, signature_type)
        }
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn create_pool_config(&self, pool_name: &str, _genesis_txn: &str) -> LedgerResult<()> {
        if self.pool_configs.insert(pool_name.to_string()) {
            Ok(())
        } else {
            Err(library(
                POOL_LEDGER_CONFIG_ALREADY_EXISTS,
                format!("Pool ledger config '{}' already exists", pool_name),
            ))
        }
    }

    async fn open_pool(&self, pool_name: &str) -> LedgerResult<PoolHandle> {
        if !self.pool_configs.contains(pool_name) {
            return Err(library(POOL_NOT_CREATED, format!("Pool '{}' not created", pool_name)));
        }
        let handle = self.handle();
        self.open_pools.insert(handle, pool_name.to_string());
        Ok(PoolHandle(handle))
    }

    async fn close_pool(&self, pool: PoolHandle) -> LedgerResult<()> {
        self.open_pools
            .remove(&pool.0)
            .map(|_| ())
            .ok_or_else(|| library(INVALID_HANDLE, format!("Invalid pool handle {}", pool.0)))
    }

    async fn delete_pool_config(&self, pool_name: &str) -> LedgerResult<()> {
        self.pool_configs
            .remove(pool_name)
            .map(|_| ())
            .ok_or_else(|| library(POOL_NOT_CREATED, format!("Pool '{}' not created", pool_name)))
    }

    async fn create_wallet(&self, _pool_name: &str, wallet_name: &str) -> LedgerResult<()> {
        if self.wallets.insert(wallet_name.to_string()) {
            Ok(())
        } else {
            Err(library(
                WALLET_ALREADY_EXISTS,
                format!("Wallet '{}' already exists", wallet_name),
            ))
        }
    }

    async fn open_wallet(&self, wallet_name: &str) -> LedgerResult<WalletHandle> {
        if !self.wallets.contains(wallet_name) {
            return Err(library(WALLET_NOT_FOUND, format!("Wallet '{}' not found", wallet_name)));
        }
        let handle = self.handle();
        self.open_wallets.insert(handle, wallet_name.to_string());
        Ok(WalletHandle(handle))
    }

    async fn close_wallet(&self, wallet: WalletHandle) -> LedgerResult<()> {
        self.open_wallets
            .remove(&wallet.0)
            .map(|_| ())
            .ok_or_else(|| library(INVALID_HANDLE, format!("Invalid wallet handle {}", wallet.0)))
    }

    async fn delete_wallet(&self, wallet_name: &str) -> LedgerResult<()> {
        self.wallets
            .remove(wallet_name)
            .map(|_| ())
            .ok_or_else(|| library(WALLET_NOT_FOUND, format!("Wallet '{}' not found", wallet_name)))
    }

    async fn create_and_store_did(
        &self,
        wallet: WalletHandle,
        seed: Option<&str>,
    ) -> LedgerResult<(Did, Verkey)> {
        self.check_wallet(wallet)?;
        let did = match seed {
            Some(seed) => {
                let tail: Vec<char> = seed.chars().rev().take(16).collect();
                format!("Sim{}", tail.into_iter().rev().collect::<String>())
            }
            None => random_string("", "", 22, DID_CHARS),
        };
        let verkey = random_string("~", "", 23, DID_CHARS);
        Ok((Did(did), Verkey(verkey)))
    }

    async fn build_request(
        &self,
        submitter: &Did,
        params: &RequestParams,
    ) -> LedgerResult<RequestBlob> {
        let req = SimRequest {
            req_id: self.next_req_id.fetch_add(1, Ordering::Relaxed),
            identifier: submitter.clone(),
            operation: params.clone(),
        };
        serde_json::to_string(&req)
            .map(RequestBlob)
            .map_err(|e| library(INVALID_REQUEST, e.to_string()))
    }

    async fn sign_and_submit(
        &self,
        pool: PoolHandle,
        wallet: WalletHandle,
        submitter: &Did,
        request: &RequestBlob,
    ) -> LedgerResult<String> {
        self.check_pool(pool)?;
        self.check_wallet(wallet)?;
        let req = Self::parse(request)?;
        self.delay_and_roll().await?;

        if req.operation.is_write() {
            self.written.insert(ledger_key(submitter, &req.operation));
        }
        Ok(Self::reply(&req))
    }

    async fn submit(&self, pool: PoolHandle, request: &RequestBlob) -> LedgerResult<String> {
        self.check_pool(pool)?;
        let req = Self::parse(request)?;
        if req.operation.is_write() {
            return Err(library(INVALID_REQUEST, "Write request must be signed".to_string()));
        }
        self.delay_and_roll().await?;

        let key = ledger_key(&req.identifier, &req.operation);
        if self.written.contains(&key) {
            Ok(Self::reply(&req))
        } else {
            Err(library(LEDGER_NOT_FOUND, format!("No ledger entry for {}", key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> SimulatedLedger {
        SimulatedLedger::new(SimulationConfig {
            latency_ms: 0,
            failure_rate: 0.0,
        })
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let ledger = instant();
        ledger.create_pool_config("pool", "genesis").await.unwrap();
        let err = ledger.create_pool_config("pool", "genesis").await.unwrap_err();
        assert_eq!(err.code(), Some(POOL_LEDGER_CONFIG_ALREADY_EXISTS));

        ledger.create_wallet("pool", "wallet").await.unwrap();
        let err = ledger.create_wallet("pool", "wallet").await.unwrap_err();
        assert_eq!(err.code(), Some(WALLET_ALREADY_EXISTS));
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let ledger = instant();
        ledger.create_pool_config("pool", "genesis").await.unwrap();
        let pool = ledger.open_pool("pool").await.unwrap();
        ledger.create_wallet("pool", "wallet").await.unwrap();
        let wallet = ledger.open_wallet("wallet").await.unwrap();
        let (submitter, _) = ledger
            .create_and_store_did(wallet, Some("000000000000000000000000Trustee1"))
            .await
            .unwrap();
        let (target, _) = ledger.create_and_store_did(wallet, None).await.unwrap();

        let get = ledger
            .build_request(&submitter, &RequestParams::GetNym { target: target.clone() })
            .await
            .unwrap();
        assert!(ledger.submit(pool, &get).await.is_err());

        let nym = ledger
            .build_request(
                &submitter,
                &RequestParams::Nym {
                    target: target.clone(),
                    verkey: None,
                },
            )
            .await
            .unwrap();
        ledger.sign_and_submit(pool, wallet, &submitter, &nym).await.unwrap();
        assert!(ledger.submit(pool, &get).await.is_ok());
        assert_eq!(ledger.written_count(), 1);
    }

    #[tokio::test]
    async fn test_closed_handles_rejected() {
        let ledger = instant();
        ledger.create_pool_config("pool", "genesis").await.unwrap();
        let pool = ledger.open_pool("pool").await.unwrap();
        ledger.close_pool(pool).await.unwrap();
        assert!(ledger.close_pool(pool).await.is_err());

        let blob = ledger
            .build_request(
                &Did("a".to_string()),
                &RequestParams::GetNym {
                    target: Did("b".to_string()),
                },
            )
            .await
            .unwrap();
        let err = ledger.submit(pool, &blob).await.unwrap_err();
        assert_eq!(err.code(), Some(INVALID_HANDLE));
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_rejects() {
        let ledger = SimulatedLedger::new(SimulationConfig {
            latency_ms: 0,
            failure_rate: 1.0,
        });
        ledger.create_pool_config("pool", "genesis").await.unwrap();
        let pool = ledger.open_pool("pool").await.unwrap();
        ledger.create_wallet("pool", "wallet").await.unwrap();
        let wallet = ledger.open_wallet("wallet").await.unwrap();
        let (did, _) = ledger.create_and_store_did(wallet, None).await.unwrap();
        let blob = ledger
            .build_request(&did, &RequestParams::Nym { target: did.clone(), verkey: None })
            .await
            .unwrap();
        let err = ledger.sign_and_submit(pool, wallet, &did, &blob).await.unwrap_err();
        assert_eq!(err.code(), Some(SIMULATED_REJECT));
        assert_eq!(ledger.written_count(), 0);
    }
}
