//! Client-library seam
//!
//! Everything the harness asks of the ledger goes through [`LedgerClient`].
//! The harness never looks inside a [`RequestBlob`]; building, signing and
//! submitting are the library's business.

mod http;
mod simulated;

pub use http::HttpLedgerClient;
pub use simulated::{SimulatedLedger, SimulationConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Library error code for "pool ledger config already exists"
pub const POOL_LEDGER_CONFIG_ALREADY_EXISTS: i32 = 306;
/// Library error code for "wallet already exists"
pub const WALLET_ALREADY_EXISTS: i32 = 203;

/// Handle to an opened pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolHandle(pub i32);

/// Handle to an opened wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletHandle(pub i32);

/// Decentralized identifier as returned by the library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(pub String);

/// Verification key paired with a [`Did`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verkey(pub String);

/// Opaque request produced by [`LedgerClient::build_request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestBlob(pub String);

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RequestBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters handed to the library's request builders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestParams {
    Nym {
        target: Did,
        verkey: Option<Verkey>,
    },
    Schema {
        data: serde_json::Value,
    },
    Attrib {
        target: Did,
        raw: serde_json::Value,
    },
    ClaimDef {
        seq_no: u64,
        signature_type: String,
        data: serde_json::Value,
    },
    GetNym {
        target: Did,
    },
    GetSchema {
        dest: Did,
        data: serde_json::Value,
    },
    GetAttrib {
        target: Did,
        raw_name: String,
    },
    GetClaimDef {
        seq_no: u64,
        signature_type: String,
        issuer: Did,
    },
}

impl RequestParams {
    /// Whether the request changes ledger state (and so must be signed)
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            RequestParams::Nym { .. }
                | RequestParams::Schema { .. }
                | RequestParams::Attrib { .. }
                | RequestParams::ClaimDef { .. }
        )
    }
}

/// Errors surfaced by a [`LedgerClient`]
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Library error {code}: {message}")]
    Library { code: i32, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LedgerError {
    /// Library error code, if the library produced one
    pub fn code(&self) -> Option<i32> {
        match self {
            LedgerError::Library { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LedgerError::Timeout)
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Asynchronous interface of the external ledger client library
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn create_pool_config(&self, pool_name: &str, genesis_txn: &str) -> LedgerResult<()>;

    async fn open_pool(&self, pool_name: &str) -> LedgerResult<PoolHandle>;

    async fn close_pool(&self, pool: PoolHandle) -> LedgerResult<()>;

    async fn delete_pool_config(&self, pool_name: &str) -> LedgerResult<()>;

    async fn create_wallet(&self, pool_name: &str, wallet_name: &str) -> LedgerResult<()>;

    async fn open_wallet(&self, wallet_name: &str) -> LedgerResult<WalletHandle>;

    async fn close_wallet(&self, wallet: WalletHandle) -> LedgerResult<()>;

    async fn delete_wallet(&self, wallet_name: &str) -> LedgerResult<()>;

    /// Create a DID in the wallet; a seed makes it deterministic
    async fn create_and_store_did(
        &self,
        wallet: WalletHandle,
        seed: Option<&str>,
    ) -> LedgerResult<(Did, Verkey)>;

    async fn build_request(&self, submitter: &Did, params: &RequestParams)
        -> LedgerResult<RequestBlob>;

    async fn sign_and_submit(
        &self,
        pool: PoolHandle,
        wallet: WalletHandle,
        submitter: &Did,
        request: &RequestBlob,
    ) -> LedgerResult<String>;

    async fn submit(&self, pool: PoolHandle, request: &RequestBlob) -> LedgerResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_params_tagging() {
        let params = RequestParams::GetNym {
            target: Did("V4SGRU86Z58d6TV7PBUe6f".to_string()),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["type"], "get_nym");
        assert_eq!(json["target"], "V4SGRU86Z58d6TV7PBUe6f");
        assert!(!params.is_write());

        let params = RequestParams::Nym {
            target: Did("x".to_string()),
            verkey: None,
        };
        assert!(params.is_write());
    }

    #[test]
    fn test_error_code() {
        let err = LedgerError::Library {
            code: WALLET_ALREADY_EXISTS,
            message: "exists".to_string(),
        };
        assert_eq!(err.code(), Some(203));
        assert!(!err.is_timeout());
        assert_eq!(LedgerError::Timeout.code(), None);
    }
}
