//! IPFS content store over the Kubo HTTP RPC API.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::cas::ContentStore;
use crate::error::CasError;

const DEFAULT_API: &str = "http://127.0.0.1:5001";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Response of `/api/v0/add`.
#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Error body of the RPC API.
#[derive(Deserialize)]
struct RpcError {
    #[serde(rename = "Message")]
    message: String,
}

/// [`ContentStore`] backed by an IPFS node.
///
/// Uploads use CIDv1 with pinning, so the id depends only on the bytes and
/// the node keeps the object.
pub struct IpfsClient {
    client: Client,
    api_url: String,
}

impl IpfsClient {
    pub fn new(api_url: &str) -> Result<Self, CasError> {
        Self::with_timeout(api_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(api_url: &str, timeout: Duration) -> Result<Self, CasError> {
        let api_url = if api_url.is_empty() {
            DEFAULT_API.to_string()
        } else {
            api_url.trim_end_matches('/').to_string()
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CasError::Unavailable(e.to_string()))?;
        Ok(Self { client, api_url })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

fn transport_error(e: reqwest::Error) -> CasError {
    if e.is_timeout() {
        CasError::Timeout
    } else {
        CasError::Unavailable(e.to_string())
    }
}

fn classify(status: StatusCode, body: &[u8], cid: Option<&str>) -> CasError {
    let message = serde_json::from_slice::<RpcError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    let lower = message.to_ascii_lowercase();
    if let Some(cid) = cid {
        if lower.contains("not found") || lower.contains("invalid cid") {
            return CasError::NotFound(cid.to_string());
        }
    }
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return CasError::Unavailable(format!("HTTP {status}: {message}"));
    }
    CasError::Rejected(format!("HTTP {status}: {message}"))
}

#[async_trait::async_trait]
impl ContentStore for IpfsClient {
    async fn put(&self, data: &[u8]) -> Result<String, CasError> {
        let url = format!("{}/api/v0/add?cid-version=1&pin=true", self.api_url);
        let part = Part::bytes(data.to_vec()).file_name("payload.json");
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify(status, &body, None));
        }

        let added: AddResponse = serde_json::from_slice(&body)
            .map_err(|e| CasError::Rejected(format!("decode add response: {e}")))?;
        debug!(cid = %added.hash, bytes = data.len(), "ipfs: added");
        Ok(added.hash)
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>, CasError> {
        let url = format!("{}/api/v0/cat", self.api_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify(status, &body, Some(cid)));
        }
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_api_url() {
        let c = IpfsClient::new("").unwrap();
        assert_eq!(c.api_url(), DEFAULT_API);
        let c = IpfsClient::new("http://ipfs:5001/").unwrap();
        assert_eq!(c.api_url(), "http://ipfs:5001");
    }

    #[test]
    fn classify_rpc_errors() {
        let body = br#"{"Message":"block was not found locally (offline): ipld: could not find bafy","Code":0,"Type":"error"}"#;
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, body, Some("bafy")),
            CasError::NotFound("bafy".into())
        );
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, b"down", None).is_retryable());
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, br#"{"Message":"bad arg"}"#, None),
            CasError::Rejected(_)
        ));
    }
}
