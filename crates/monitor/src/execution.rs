//! Minimal JSON-RPC client for the execution-layer node.
//!
//! The monitor only ever reads the head block and historical account
//! balances, so this stays a thin reqwest wrapper rather than pulling in a
//! full provider stack.

use alloy_primitives::{
    Address,
    B256,
    U64,
    U256,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use url::Url;

/// Timeout applied to every execution-node request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ExecutionClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON-RPC error code {code}: {message}")]
    JsonRpc { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("execution node returned no head block")]
    MissingHead,
}

/// Head block as reported by the execution node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionHead {
    pub number: u64,
    pub hash: B256,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    jsonrpc: String,
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: U64,
    hash: B256,
}

/// Execution-node JSON-RPC client.
#[derive(Debug, Clone)]
pub struct ExecutionClient {
    client: reqwest::Client,
    url: Url,
    request_id: Arc<AtomicU64>,
}

impl ExecutionClient {
    pub fn new(url: Url) -> Result<Self, ExecutionClientError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url,
            request_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<P, R>(
        &self,
        method: &'static str,
        params: P,
    ) -> Result<Option<R>, ExecutionClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::SeqCst),
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExecutionClientError::InvalidResponse(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let body: JsonRpcResponse<R> = response.json().await.map_err(|e| {
            ExecutionClientError::InvalidResponse(format!("malformed JSON-RPC body: {e}"))
        })?;

        if body.jsonrpc != "2.0" {
            return Err(ExecutionClientError::InvalidResponse(format!(
                "invalid JSON-RPC version: {}",
                body.jsonrpc
            )));
        }

        if let Some(error) = body.error {
            return Err(ExecutionClientError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result)
    }

    /// Number and hash of the node's latest block.
    pub async fn head(&self) -> Result<ExecutionHead, ExecutionClientError> {
        let block: RpcBlock = self
            .request("eth_getBlockByNumber", ("latest", false))
            .await?
            .ok_or(ExecutionClientError::MissingHead)?;

        Ok(ExecutionHead {
            number: block.number.to::<u64>(),
            hash: block.hash,
        })
    }

    /// Balance of `address` in wei at the given historical block height.
    pub async fn balance_at(
        &self,
        address: Address,
        block_number: u64,
    ) -> Result<U256, ExecutionClientError> {
        self.request("eth_getBalance", (address, U64::from(block_number)))
            .await?
            .ok_or_else(|| {
                ExecutionClientError::InvalidResponse("missing balance result".to_string())
            })
    }
}
