//! Stateless health probing of one (beacon, execution) node pair.

use crate::execution::{
    ExecutionClient,
    ExecutionClientError,
};
use beacon_client::{
    BeaconClient,
    BeaconClientError,
};
use tracing::debug;
use url::Url;

/// How far apart the consensus view of the execution head and the execution
/// node's own head may drift before the pair counts as out of sync.
pub const NODE_SYNC_TOLERANCE_BLOCKS: u64 = 3;

/// Which half of the primary/fallback arrangement a pair occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Primary,
    Fallback,
}

impl NodeRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// Outcome classification of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Healthy,
    NotConfigured,
    ClUnreachable,
    ClSyncing,
    ElUnreachable,
    ClElMismatch,
    OutOfSync,
}

impl NodeStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Human-readable form used in notifications.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::NotConfigured => "Not Configured",
            Self::ClUnreachable => "CL Unreachable",
            Self::ClSyncing => "CL Syncing",
            Self::ElUnreachable => "EL Unreachable",
            Self::ClElMismatch => "CL/EL Mismatch",
            Self::OutOfSync => "Out Of Sync",
        }
    }

    /// Stable snake_case form used as a metrics label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::NotConfigured => "not_configured",
            Self::ClUnreachable => "cl_unreachable",
            Self::ClSyncing => "cl_syncing",
            Self::ElUnreachable => "el_unreachable",
            Self::ClElMismatch => "cl_el_mismatch",
            Self::OutOfSync => "out_of_sync",
        }
    }
}

/// Result of probing one node pair. Produced fresh on every probe and only
/// compared against previously stored statuses, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHealth {
    pub status: NodeStatus,
    pub sync_distance: Option<u64>,
}

impl NodeHealth {
    pub fn of(status: NodeStatus) -> Self {
        Self {
            status,
            sync_distance: None,
        }
    }

    pub fn syncing(distance: u64) -> Self {
        Self {
            status: NodeStatus::ClSyncing,
            sync_distance: Some(distance),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

/// One (beacon, execution) pair plus the clients to reach it. A pair with a
/// missing half always probes as `NotConfigured`.
#[derive(Debug, Clone)]
pub struct NodePair {
    role: NodeRole,
    beacon: Option<BeaconClient>,
    execution: Option<ExecutionClient>,
}

impl NodePair {
    pub fn new(
        role: NodeRole,
        beacon_url: Option<Url>,
        execution_url: Option<Url>,
    ) -> Result<Self, PairConfigError> {
        let beacon = beacon_url.map(BeaconClient::new).transpose()?;
        let execution = execution_url.map(ExecutionClient::new).transpose()?;

        Ok(Self {
            role,
            beacon,
            execution,
        })
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn beacon(&self) -> Option<&BeaconClient> {
        self.beacon.as_ref()
    }

    pub fn execution(&self) -> Option<&ExecutionClient> {
        self.execution.as_ref()
    }

    /// Run the health checks against this pair, short-circuiting on the first
    /// failing step. Remote failures are classified, never propagated.
    pub async fn probe(&self) -> NodeHealth {
        let (Some(beacon), Some(execution)) = (&self.beacon, &self.execution) else {
            return NodeHealth::of(NodeStatus::NotConfigured);
        };

        let sync = match beacon.syncing().await {
            Ok(sync) => sync,
            Err(err) => {
                debug!(node = self.role.label(), error = %err, "beacon sync status check failed");
                return NodeHealth::of(NodeStatus::ClUnreachable);
            }
        };
        if sync.is_syncing {
            return NodeHealth::syncing(sync.sync_distance);
        }

        let head = match beacon.head_block().await {
            Ok(head) => head,
            Err(err) => {
                debug!(node = self.role.label(), error = %err, "beacon head fetch failed");
                return NodeHealth::of(NodeStatus::ClUnreachable);
            }
        };

        let el_head = match execution.head().await {
            Ok(el_head) => el_head,
            Err(err) => {
                debug!(node = self.role.label(), error = %err, "execution head fetch failed");
                return NodeHealth::of(NodeStatus::ElUnreachable);
            }
        };

        let payload = &head.body.execution_payload;
        if el_head.number == payload.block_number && el_head.hash != payload.block_hash {
            return NodeHealth::of(NodeStatus::ClElMismatch);
        }
        if el_head.number.abs_diff(payload.block_number) > NODE_SYNC_TOLERANCE_BLOCKS {
            return NodeHealth::of(NodeStatus::OutOfSync);
        }

        NodeHealth::of(NodeStatus::Healthy)
    }
}

/// Startup-time client construction failures. These halt the process before
/// monitoring begins.
#[derive(Debug, thiserror::Error)]
pub enum PairConfigError {
    #[error(transparent)]
    Beacon(#[from] BeaconClientError),
    #[error(transparent)]
    Execution(#[from] ExecutionClientError),
}
