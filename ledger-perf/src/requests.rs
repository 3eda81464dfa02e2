//! Per-kind request flows
//!
//! A write flow does whatever set-up its kind needs (fresh DIDs, a NYM for
//! them, random payloads) and then signs and submits one request. A read
//! flow turns a [`RequestInfo`] back into the matching GET request ahead of
//! time and later submits it unsigned. Only the final submission is timed.

use crate::ledger::{
    Did, LedgerClient, LedgerError, LedgerResult, PoolHandle, RequestBlob, RequestParams,
    WalletHandle,
};
use crate::metrics::RequestOutcome;
use crate::request_info::RequestInfo;
use crate::request_log::RequestLog;
use crate::util::{random_digits, random_name};
use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Attribute name written by attribute flows
const ATTRIBUTE_RAW_NAME: &str = "endpoint";
const SCHEMA_VERSION: &str = "1.0";
const CLAIM_SIGNATURE_TYPE: &str = "CL";
const MAX_CLAIM_SEQ_NO: u64 = 1_000_000;

/// Kind of ledger transaction exercised by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    #[default]
    Nym,
    Schema,
    Attribute,
    Claim,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Nym => "nym",
            RequestKind::Schema => "schema",
            RequestKind::Attribute => "attribute",
            RequestKind::Claim => "claim",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opened pool and wallet plus the identity requests are sent with
pub struct Session {
    pub client: Arc<dyn LedgerClient>,
    pub pool: PoolHandle,
    pub wallet: WalletHandle,
    pub submitter: Did,
    pub request_log: Option<Arc<RequestLog>>,
}

/// A write request ready for its final, timed submission
struct PreparedWrite {
    signer: Did,
    request: RequestBlob,
    info: RequestInfo,
}

impl Session {
    /// Run one write flow of `kind`.
    ///
    /// Returns the outcome and, when it passed, the record a later read run
    /// needs.
    pub async fn send_write(&self, kind: RequestKind) -> (RequestOutcome, Option<RequestInfo>) {
        let prepared = match kind {
            RequestKind::Nym => self.prepare_nym().await,
            RequestKind::Schema => self.prepare_schema().await,
            RequestKind::Attribute => self.prepare_attribute().await,
            RequestKind::Claim => self.prepare_claim().await,
        };

        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(%kind, error = %e, "Cannot build request. Skip sending...");
                return (outcome_from_error(e), None);
            }
        };

        let start = Instant::now();
        let result = self
            .client
            .sign_and_submit(self.pool, self.wallet, &prepared.signer, &prepared.request)
            .await;
        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                debug!(%kind, latency_ms = elapsed.as_millis(), %response, "Request submitted");
                self.log_request(&prepared.request, Some(elapsed));
                (RequestOutcome::Passed(elapsed), Some(prepared.info))
            }
            Err(e) => {
                warn!(%kind, error = %e, request = %prepared.request, "Cannot submit request");
                self.log_request(&prepared.request, None);
                (outcome_from_error(e), None)
            }
        }
    }

    /// Build the GET request for one record.
    ///
    /// Records of another kind and build failures come back as the outcome
    /// to record in place of a submission.
    pub async fn prepare_read(
        &self,
        kind: RequestKind,
        info: &RequestInfo,
    ) -> Result<RequestBlob, RequestOutcome> {
        if info.kind() != kind {
            debug!(expected = %kind, found = %info.kind(), "Skipping request info of another kind");
            return Err(RequestOutcome::Skipped);
        }

        self.client
            .build_request(&self.submitter, &read_params(info))
            .await
            .map_err(|e| {
                warn!(%kind, error = %e, "Cannot build get request. Skip sending...");
                outcome_from_error(e)
            })
    }

    /// Submit a prepared GET request; only the submission is timed
    pub async fn submit_read(&self, kind: RequestKind, request: &RequestBlob) -> RequestOutcome {
        let start = Instant::now();
        let result = self.client.submit(self.pool, request).await;
        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                debug!(%kind, latency_ms = elapsed.as_millis(), %response, "Get request submitted");
                self.log_request(request, Some(elapsed));
                RequestOutcome::Passed(elapsed)
            }
            Err(e) => {
                warn!(%kind, error = %e, %request, "Cannot submit get request");
                self.log_request(request, None);
                outcome_from_error(e)
            }
        }
    }

    fn log_request(&self, request: &RequestBlob, elapsed: Option<std::time::Duration>) {
        if let Some(log) = &self.request_log {
            log.record(&request.0, elapsed);
        }
    }

    async fn prepare_nym(&self) -> LedgerResult<PreparedWrite> {
        let (did, _) = self.client.create_and_store_did(self.wallet, None).await?;
        let request = self
            .client
            .build_request(
                &self.submitter,
                &RequestParams::Nym {
                    target: did.clone(),
                    verkey: None,
                },
            )
            .await?;

        Ok(PreparedWrite {
            signer: self.submitter.clone(),
            request,
            info: RequestInfo::Nym { target_did: did },
        })
    }

    async fn prepare_schema(&self) -> LedgerResult<PreparedWrite> {
        let name = random_name("test");
        let data = json!({
            "name": name,
            "version": SCHEMA_VERSION,
            "attr_names": ["test"],
        });
        let request = self
            .client
            .build_request(&self.submitter, &RequestParams::Schema { data })
            .await?;

        Ok(PreparedWrite {
            signer: self.submitter.clone(),
            request,
            info: RequestInfo::Schema {
                name,
                version: SCHEMA_VERSION.to_string(),
                dest: self.submitter.clone(),
            },
        })
    }

    async fn prepare_attribute(&self) -> LedgerResult<PreparedWrite> {
        let did = self.register_fresh_did().await?;
        let raw = json!({ "endpoint": { "ha": "127.0.0.1:5555" } });
        let request = self
            .client
            .build_request(
                &did,
                &RequestParams::Attrib {
                    target: did.clone(),
                    raw,
                },
            )
            .await?;

        Ok(PreparedWrite {
            signer: did.clone(),
            request,
            info: RequestInfo::Attribute {
                target_did: did,
                raw_name: ATTRIBUTE_RAW_NAME.to_string(),
            },
        })
    }

    async fn prepare_claim(&self) -> LedgerResult<PreparedWrite> {
        let did = self.register_fresh_did().await?;
        let seq_no = rand::thread_rng().gen_range(1..=MAX_CLAIM_SEQ_NO);
        let data = json!({
            "primary": {
                "n": random_digits(),
                "s": random_digits(),
                "rms": random_digits(),
                "r": { "name": random_digits() },
                "rctxt": random_digits(),
                "z": random_digits(),
            }
        });
        let request = self
            .client
            .build_request(
                &did,
                &RequestParams::ClaimDef {
                    seq_no,
                    signature_type: CLAIM_SIGNATURE_TYPE.to_string(),
                    data,
                },
            )
            .await?;

        Ok(PreparedWrite {
            signer: did.clone(),
            request,
            info: RequestInfo::Claim {
                issuer_did: did,
                seq_no,
                signature_type: CLAIM_SIGNATURE_TYPE.to_string(),
            },
        })
    }

    /// Create a DID with its verkey and put it on the ledger as the submitter
    async fn register_fresh_did(&self) -> LedgerResult<Did> {
        let (did, verkey) = self.client.create_and_store_did(self.wallet, None).await?;
        let nym = self
            .client
            .build_request(
                &self.submitter,
                &RequestParams::Nym {
                    target: did.clone(),
                    verkey: Some(verkey),
                },
            )
            .await?;
        self.client
            .sign_and_submit(self.pool, self.wallet, &self.submitter, &nym)
            .await?;
        Ok(did)
    }
}

/// GET request parameters that look up the entry `info` describes
pub fn read_params(info: &RequestInfo) -> RequestParams {
    match info {
        RequestInfo::Nym { target_did } => RequestParams::GetNym {
            target: target_did.clone(),
        },
        RequestInfo::Schema { name, version, dest } => RequestParams::GetSchema {
            dest: dest.clone(),
            data: json!({ "name": name, "version": version }),
        },
        RequestInfo::Attribute { target_did, raw_name } => RequestParams::GetAttrib {
            target: target_did.clone(),
            raw_name: raw_name.clone(),
        },
        RequestInfo::Claim {
            issuer_did,
            seq_no,
            signature_type,
        } => RequestParams::GetClaimDef {
            seq_no: *seq_no,
            signature_type: signature_type.clone(),
            issuer: issuer_did.clone(),
        },
    }
}

fn outcome_from_error(e: LedgerError) -> RequestOutcome {
    if e.is_timeout() {
        RequestOutcome::TimedOut
    } else {
        RequestOutcome::Failed(e.to_string())
    }
}
