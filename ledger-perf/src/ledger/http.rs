//! HTTP gateway backend
//!
//! Wraps a reqwest client that forwards every library call to a gateway
//! process hosting the ledger client library.

use super::{
    Did, LedgerClient, LedgerError, LedgerResult, PoolHandle, RequestBlob, RequestParams, Verkey,
    WalletHandle,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Response envelope returned by the gateway for every call
#[derive(Debug, Clone, Deserialize)]
struct GatewayResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    code: Option<i32>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DidResult {
    did: Did,
    verkey: Verkey,
}

#[derive(Debug, Serialize)]
struct BuildRequestBody<'a> {
    submitter_did: &'a Did,
    params: &'a RequestParams,
}

/// Gateway-backed ledger client
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpLedgerClient {
    pub fn new(base_url: String, timeout_secs: u64, keep_alive: bool) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_secs(30));

        if !keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// POST `body` to `path` and unwrap the gateway envelope
    async fn call(&self, path: &str, body: Value) -> LedgerResult<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(timeout_ms = self.timeout.as_millis(), path, "Gateway timeout");
                    LedgerError::Timeout
                } else if e.is_connect() {
                    LedgerError::Transport(format!("Connection error: {}", e))
                } else {
                    LedgerError::Transport(format!("Request error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("HTTP {}: {}", status, body)));
        }

        let envelope = response
            .json::<GatewayResponse>()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("Parse error: {}", e)))?;

        if envelope.ok {
            debug!(path, "Gateway call succeeded");
            Ok(envelope.result)
        } else {
            Err(LedgerError::Library {
                code: envelope.code.unwrap_or(-1),
                message: envelope.message.unwrap_or_default(),
            })
        }
    }

    async fn call_unit(&self, path: &str, body: Value) -> LedgerResult<()> {
        self.call(path, body).await.map(|_| ())
    }

    async fn call_handle(&self, path: &str, body: Value) -> LedgerResult<i32> {
        let result = self.call(path, body).await?;
        result
            .as_i64()
            .and_then(|h| i32::try_from(h).ok())
            .ok_or_else(|| LedgerError::InvalidResponse(format!("expected handle, got {}", result)))
    }
}

/// Responses are handed back verbatim; non-string results are re-serialized.
fn into_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn create_pool_config(&self, pool_name: &str, genesis_txn: &str) -> LedgerResult<()> {
        self.call_unit(
            "/pool/create",
            json!({ "pool_name": pool_name, "config": { "genesis_txn": genesis_txn } }),
        )
        .await
    }

    async fn open_pool(&self, pool_name: &str) -> LedgerResult<PoolHandle> {
        self.call_handle("/pool/open", json!({ "pool_name": pool_name }))
            .await
            .map(PoolHandle)
    }

    async fn close_pool(&self, pool: PoolHandle) -> LedgerResult<()> {
        self.call_unit("/pool/close", json!({ "pool_handle": pool })).await
    }

    async fn delete_pool_config(&self, pool_name: &str) -> LedgerResult<()> {
        self.call_unit("/pool/delete", json!({ "pool_name": pool_name })).await
    }

    async fn create_wallet(&self, pool_name: &str, wallet_name: &str) -> LedgerResult<()> {
        self.call_unit(
            "/wallet/create",
            json!({ "pool_name": pool_name, "wallet_name": wallet_name }),
        )
        .await
    }

    async fn open_wallet(&self, wallet_name: &str) -> LedgerResult<WalletHandle> {
        self.call_handle("/wallet/open", json!({ "wallet_name": wallet_name }))
            .await
            .map(WalletHandle)
    }

    async fn close_wallet(&self, wallet: WalletHandle) -> LedgerResult<()> {
        self.call_unit("/wallet/close", json!({ "wallet_handle": wallet })).await
    }

    async fn delete_wallet(&self, wallet_name: &str) -> LedgerResult<()> {
        self.call_unit("/wallet/delete", json!({ "wallet_name": wallet_name })).await
    }

    async fn create_and_store_did(
        &self,
        wallet: WalletHandle,
        seed: Option<&str>,
    ) -> LedgerResult<(Did, Verkey)> {
        let did_json = match seed {
            Some(seed) => json!({ "seed": seed }),
            None => json!({}),
        };
        let result = self
            .call("/did/create", json!({ "wallet_handle": wallet, "did_json": did_json }))
            .await?;
        let parsed: DidResult = serde_json::from_value(result)
            .map_err(|e| LedgerError::InvalidResponse(format!("Parse error: {}", e)))?;
        Ok((parsed.did, parsed.verkey))
    }

    async fn build_request(
        &self,
        submitter: &Did,
        params: &RequestParams,
    ) -> LedgerResult<RequestBlob> {
        let body = serde_json::to_value(BuildRequestBody {
            submitter_did: submitter,
            params,
        })
        .map_err(|e| LedgerError::InvalidResponse(e.to_string()))?;
        let result = self.call("/ledger/build", body).await?;
        Ok(RequestBlob(into_text(result)))
    }

    async fn sign_and_submit(
        &self,
        pool: PoolHandle,
        wallet: WalletHandle,
        submitter: &Did,
        request: &RequestBlob,
    ) -> LedgerResult<String> {
        self.call(
            "/ledger/sign_and_submit",
            json!({
                "pool_handle": pool,
                "wallet_handle": wallet,
                "submitter_did": submitter,
                "request": request,
            }),
        )
        .await
        .map(into_text)
    }

    async fn submit(&self, pool: PoolHandle, request: &RequestBlob) -> LedgerResult<String> {
        self.call(
            "/ledger/submit",
            json!({ "pool_handle": pool, "request": request }),
        )
        .await
        .map(into_text)
    }
}
