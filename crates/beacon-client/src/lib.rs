//! Typed HTTP client for the Ethereum consensus-layer ("beacon") node REST API.
//!
//! Only the endpoints the monitor consumes are covered. Not-found responses on
//! block and sync-committee-duty lookups are meaningful outcomes, not errors,
//! and surface as `None`.

use alloy_primitives::{
    Address,
    B256,
};
use reqwest::{
    Client,
    StatusCode,
};
use serde::{
    Deserialize,
    Deserializer,
    de::DeserializeOwned,
};
use std::time::Duration;
use url::Url;

/// Timeout applied to every beacon-node request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum BeaconClientError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("unexpected HTTP status: {0}")]
    UnexpectedStatus(StatusCode),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Node-reported sync progress, from `/eth/v1/node/syncing`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncStatus {
    #[serde(deserialize_with = "quoted_u64")]
    pub head_slot: u64,
    #[serde(deserialize_with = "quoted_u64")]
    pub sync_distance: u64,
    pub is_syncing: bool,
}

/// The consensus-layer view of a block's execution payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionPayload {
    #[serde(deserialize_with = "quoted_u64")]
    pub block_number: u64,
    pub block_hash: B256,
    pub fee_recipient: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockBody {
    pub graffiti: B256,
    pub execution_payload: ExecutionPayload,
}

/// The signed beacon block message, stripped to the fields the monitor reads.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    #[serde(deserialize_with = "quoted_u64")]
    pub slot: u64,
    #[serde(deserialize_with = "quoted_u64")]
    pub proposer_index: u64,
    pub body: BlockBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposerDuty {
    #[serde(deserialize_with = "quoted_u64")]
    pub validator_index: u64,
    #[serde(deserialize_with = "quoted_u64")]
    pub slot: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncCommitteeDuty {
    #[serde(deserialize_with = "quoted_u64")]
    pub validator_index: u64,
}

/// Per-validator status entry from the head-state validators endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorInfo {
    #[serde(deserialize_with = "quoted_u64")]
    pub index: u64,
    pub status: String,
}

#[derive(Deserialize)]
struct Data<T> {
    data: T,
}

#[derive(Deserialize)]
struct BlockEnvelope {
    message: Block,
}

#[derive(Deserialize)]
struct HeaderData {
    header: HeaderOuter,
}

#[derive(Deserialize)]
struct HeaderOuter {
    message: HeaderMessage,
}

#[derive(Deserialize)]
struct HeaderMessage {
    #[serde(deserialize_with = "quoted_u64")]
    slot: u64,
}

/// Beacon-node REST client.
#[derive(Debug, Clone)]
pub struct BeaconClient {
    client: Client,
    base_url: Url,
}

impl BeaconClient {
    pub fn new(mut base_url: Url) -> Result<Self, BeaconClientError> {
        // Normalize so `Url::join` appends instead of replacing the last path
        // segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BeaconClientError> {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BeaconClientError::UnexpectedStatus(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Like [`Self::get_json`], but maps HTTP 404 to `None`.
    async fn get_json_opt<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, BeaconClientError> {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BeaconClientError::UnexpectedStatus(response.status()));
        }
        Ok(Some(response.json().await?))
    }

    /// The node's own sync progress.
    pub async fn syncing(&self) -> Result<SyncStatus, BeaconClientError> {
        let envelope: Data<SyncStatus> = self.get_json("eth/v1/node/syncing").await?;
        Ok(envelope.data)
    }

    /// Slot of the current chain head.
    pub async fn head_slot(&self) -> Result<u64, BeaconClientError> {
        let envelope: Data<HeaderData> = self.get_json("eth/v1/beacon/headers/head").await?;
        Ok(envelope.data.header.message.slot)
    }

    /// The current head block.
    pub async fn head_block(&self) -> Result<Block, BeaconClientError> {
        let envelope: Data<BlockEnvelope> = self.get_json("eth/v2/beacon/blocks/head").await?;
        Ok(envelope.data.message)
    }

    /// The block at `slot`, or `None` if no block was included there.
    pub async fn block_at_slot(&self, slot: u64) -> Result<Option<Block>, BeaconClientError> {
        let envelope: Option<Data<BlockEnvelope>> =
            self.get_json_opt(&format!("eth/v2/beacon/blocks/{slot}")).await?;
        Ok(envelope.map(|e| e.data.message))
    }

    /// Proposer duties for every slot of `epoch`.
    pub async fn proposer_duties(
        &self,
        epoch: u64,
    ) -> Result<Vec<ProposerDuty>, BeaconClientError> {
        let envelope: Data<Vec<ProposerDuty>> = self
            .get_json(&format!("eth/v1/validator/duties/proposer/{epoch}"))
            .await?;
        Ok(envelope.data)
    }

    /// Sync-committee duties for the requested validators in `epoch`.
    ///
    /// Returns `None` when the node answers 404, which it does for periods too
    /// far in the future to have been computed yet.
    pub async fn sync_duties(
        &self,
        epoch: u64,
        validator_indices: &[u64],
    ) -> Result<Option<Vec<SyncCommitteeDuty>>, BeaconClientError> {
        let url = self
            .base_url
            .join(&format!("eth/v1/validator/duties/sync/{epoch}"))?;
        let body: Vec<String> = validator_indices.iter().map(u64::to_string).collect();
        let response = self.client.post(url).json(&body).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BeaconClientError::UnexpectedStatus(response.status()));
        }
        let envelope: Data<Vec<SyncCommitteeDuty>> = response.json().await?;
        Ok(Some(envelope.data))
    }

    /// Current status of the requested validators, in one batched call.
    pub async fn validators(
        &self,
        validator_indices: &[u64],
    ) -> Result<Vec<ValidatorInfo>, BeaconClientError> {
        let ids = validator_indices
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = self.base_url.join("eth/v1/beacon/states/head/validators")?;
        let response = self.client.get(url).query(&[("id", ids)]).send().await?;
        if !response.status().is_success() {
            return Err(BeaconClientError::UnexpectedStatus(response.status()));
        }
        let envelope: Data<Vec<ValidatorInfo>> = response.json().await?;
        Ok(envelope.data)
    }
}

/// Decode the 32-byte graffiti field into the printable string proposers
/// usually put there. Trailing zero padding is stripped; anything that is not
/// valid UTF-8 is replaced lossily.
pub fn decode_graffiti(graffiti: &B256) -> String {
    let bytes = graffiti.as_slice();
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Beacon API integers are JSON strings.
fn quoted_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}
