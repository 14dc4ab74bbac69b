//! HTTP JSON-RPC client for a PascalCoin node, backed by `reqwest`.
//!
//! Transport failures and malformed responses are returned as errors. A
//! structured error object from the node is logged and turned into an empty
//! result, so callers see "no such block" or "no pending operations".
//! Requests are not retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use pascfeed_core::node::{AccountRecord, BlockRecord, NodeClient, OperationRecord, PublicKeyRecord};
use pascfeed_core::{AccountNumber, FeedError};

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Configuration for `HttpNodeClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct HttpNodeClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl HttpNodeClient {
    /// Create a client for the node's JSON-RPC endpoint, e.g.
    /// `http://127.0.0.1:4003`.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
            request_timeout: config.request_timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp.bytes().await.map_err(|e| self.map_reqwest(e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Http(e.to_string())
        }
    }

    /// Call `method` and decode its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::trace!(id, method, "rpc request");
        let resp = self.send(&req).await?;
        match decode(resp) {
            Err(e) if e.is_protocol_error() => {
                tracing::warn!(method, error = %e, "node returned an error");
                Ok(None)
            }
            other => other,
        }
    }
}

/// Decode a response. A `null` result is `Ok(None)`; a node error object is
/// `TransportError::Rpc`.
fn decode<T: DeserializeOwned>(resp: JsonRpcResponse) -> Result<Option<T>, TransportError> {
    match resp.into_result().map_err(TransportError::Rpc)? {
        Value::Null => Ok(None),
        value => Ok(Some(serde_json::from_value(value)?)),
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn block_count(&self) -> Result<Option<u64>, FeedError> {
        Ok(self.call("getblockcount", json!({})).await?)
    }

    async fn block(&self, number: u64) -> Result<Option<BlockRecord>, FeedError> {
        Ok(self.call("getblock", json!({ "block": number })).await?)
    }

    async fn block_operations(
        &self,
        number: u64,
        start: u64,
        max: u64,
    ) -> Result<Vec<OperationRecord>, FeedError> {
        let ops: Option<Vec<OperationRecord>> = self
            .call(
                "getblockoperations",
                json!({ "block": number, "start": start, "max": max }),
            )
            .await?;
        Ok(ops.unwrap_or_default())
    }

    async fn pending_operations(
        &self,
        start: u64,
        max: u64,
    ) -> Result<Vec<Option<OperationRecord>>, FeedError> {
        let ops: Option<Vec<Option<OperationRecord>>> = self
            .call("getpendings", json!({ "start": start, "max": max }))
            .await?;
        Ok(ops.unwrap_or_default())
    }

    async fn account(&self, number: AccountNumber) -> Result<Option<AccountRecord>, FeedError> {
        Ok(self
            .call("getaccount", json!({ "account": number.account() }))
            .await?)
    }

    async fn decode_public_key(&self, hex: &str) -> Result<Option<PublicKeyRecord>, FeedError> {
        Ok(self.call("decodepubkey", json!({ "enc_pubkey": hex })).await?)
    }
}
