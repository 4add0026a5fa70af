//! HTTP client for a contract REST gateway.
//!
//! The gateway exposes two endpoints, `POST {base}/query` and
//! `POST {base}/invoke`, both taking
//! `{"channel", "contract", "function", "args"}`. A successful query returns
//! the contract's JSON result; a failed call returns a non-2xx status with
//! the contract error message in the body.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::{Ledger, LedgerRecord};

const DEFAULT_CHANNEL: &str = "mychannel";
const DEFAULT_CONTRACT: &str = "cidrecord";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder-style configuration for [`GatewayLedger`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub channel: String,
    pub contract: String,
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            contract: DEFAULT_CONTRACT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_channel(mut self, channel: &str) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn with_contract(mut self, contract: &str) -> Self {
        self.contract = contract.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct CallRequest<'a> {
    channel: &'a str,
    contract: &'a str,
    function: &'a str,
    args: &'a [&'a str],
}

#[derive(Debug, Clone, Copy)]
enum CallKind {
    Query,
    Invoke,
}

impl CallKind {
    fn path(self) -> &'static str {
        match self {
            CallKind::Query => "query",
            CallKind::Invoke => "invoke",
        }
    }
}

/// [`Ledger`] implementation over a contract REST gateway.
pub struct GatewayLedger {
    client: Client,
    cfg: GatewayConfig,
}

impl GatewayLedger {
    pub fn new(cfg: GatewayConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(Self { client, cfg })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.cfg
    }

    async fn call(
        &self,
        kind: CallKind,
        function: &str,
        args: &[&str],
        key: &str,
    ) -> Result<Vec<u8>, LedgerError> {
        let url = format!("{}/{}", self.cfg.base_url, kind.path());
        let body = CallRequest {
            channel: &self.cfg.channel,
            contract: &self.cfg.contract,
            function,
            args,
        };
        debug!(function, key, kind = kind.path(), "ledger: call");

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            let message = String::from_utf8_lossy(&bytes).into_owned();
            return Err(classify(status, &message, key));
        }
        Ok(bytes.to_vec())
    }
}

fn transport_error(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Unavailable(e.to_string())
    }
}

/// Map a failed gateway response to a [`LedgerError`]. Contract messages
/// win over the HTTP status because gateways commonly report chaincode
/// errors as 500.
fn classify(status: StatusCode, message: &str, key: &str) -> LedgerError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("already exists") {
        return LedgerError::AlreadyExists(key.to_string());
    }
    if lower.contains("does not exist") || lower.contains("not found") {
        return LedgerError::NotFound(key.to_string());
    }
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return LedgerError::Unavailable(format!("HTTP {status}: {message}"));
    }
    LedgerError::Rejected(format!("HTTP {status}: {message}"))
}

/// `GetCID` may answer with a JSON string, a record, or an object holding
/// just the cid.
#[derive(Deserialize)]
#[serde(untagged)]
enum CidAnswer {
    Cid(String),
    Record(LedgerRecord),
    Field { cid: String },
}

/// Content ids are multibase or `<algo>:<hex>` tokens.
fn is_cid_token(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 256
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'-' | b'_'))
}

fn checked_cid(cid: String) -> Result<Option<String>, LedgerError> {
    if cid.is_empty() {
        Ok(None)
    } else if is_cid_token(&cid) {
        Ok(Some(cid))
    } else {
        Err(LedgerError::Decode(format!("malformed cid {cid:?}")))
    }
}

fn decode_cid(bytes: &[u8]) -> Result<Option<String>, LedgerError> {
    if is_empty_result(bytes) {
        return Ok(None);
    }
    match serde_json::from_slice::<CidAnswer>(bytes) {
        Ok(CidAnswer::Cid(cid)) => checked_cid(cid),
        Ok(CidAnswer::Record(rec)) => match rec.confirmed_cid() {
            Some(cid) => checked_cid(cid.to_string()),
            None => Ok(None),
        },
        Ok(CidAnswer::Field { cid }) => checked_cid(cid),
        Err(e) => {
            // Plain-text answers carry the cid verbatim.
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            if is_cid_token(&text) {
                Ok(Some(text))
            } else {
                Err(LedgerError::Decode(format!("unexpected GetCID answer: {e}")))
            }
        }
    }
}

fn decode_records(bytes: &[u8]) -> Result<Vec<LedgerRecord>, LedgerError> {
    if is_empty_result(bytes) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Decode(e.to_string()))
}

fn is_empty_result(bytes: &[u8]) -> bool {
    let trimmed = String::from_utf8_lossy(bytes);
    let trimmed = trimmed.trim();
    trimmed.is_empty() || trimmed == "null"
}

#[async_trait::async_trait]
impl Ledger for GatewayLedger {
    async fn register_hash(&self, key: &str, meta: &str) -> Result<(), LedgerError> {
        self.call(CallKind::Invoke, "RegisterHash", &[key, meta], key)
            .await
            .map(|_| ())
    }

    async fn get_cid(&self, key: &str) -> Result<Option<String>, LedgerError> {
        match self.call(CallKind::Query, "GetCID", &[key], key).await {
            Ok(bytes) => decode_cid(&bytes),
            Err(LedgerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn read_record(&self, key: &str) -> Result<Option<LedgerRecord>, LedgerError> {
        match self.call(CallKind::Query, "ReadCIDRecord", &[key], key).await {
            Ok(bytes) if is_empty_result(&bytes) => Ok(None),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Decode(e.to_string())),
            Err(LedgerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn confirm_cid_upload(&self, key: &str, cid: &str) -> Result<(), LedgerError> {
        self.call(CallKind::Invoke, "ConfirmCIDUpload", &[key, cid], key)
            .await
            .map(|_| ())
    }

    async fn delete_cid_record(&self, key: &str) -> Result<(), LedgerError> {
        self.call(CallKind::Invoke, "DeleteCIDRecord", &[key], key)
            .await
            .map(|_| ())
    }

    async fn get_all_cid_records(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let bytes = self
            .call(CallKind::Query, "GetAllCIDRecords", &[], "*")
            .await?;
        decode_records(&bytes)
    }
}
