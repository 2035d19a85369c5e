//! Primary/fallback arbitration with edge-triggered transition notifications.
//!
//! Stored statuses start out unknown so the very first probe of a slot always
//! reports. While the primary is healthy the fallback is deliberately not
//! probed; its stored status can therefore go stale until the primary next
//! fails, which is accepted behavior rather than a bug to fix.

use crate::{
    metrics,
    notify::{
        Notify,
        transition_message,
    },
    probe::{
        NodeHealth,
        NodePair,
        NodeRole,
        NodeStatus,
    },
};
use async_trait::async_trait;
use tracing::{
    error,
    warn,
};

/// Probing seam, so arbitration can be exercised against scripted outcomes.
#[async_trait]
pub trait Probe: Send + Sync {
    fn role(&self) -> NodeRole;
    async fn probe(&self) -> NodeHealth;
}

#[async_trait]
impl Probe for NodePair {
    fn role(&self) -> NodeRole {
        NodePair::role(self)
    }

    async fn probe(&self) -> NodeHealth {
        NodePair::probe(self).await
    }
}

/// Picks the node pair that serves this tick's validator checks.
pub struct FailoverArbiter<P = NodePair> {
    primary: P,
    fallback: P,
    primary_status: Option<NodeStatus>,
    fallback_status: Option<NodeStatus>,
}

impl<P: Probe> FailoverArbiter<P> {
    pub fn new(primary: P, fallback: P) -> Self {
        Self {
            primary,
            fallback,
            primary_status: None,
            fallback_status: None,
        }
    }

    /// Probe the primary, falling back only when it is unhealthy. Emits one
    /// transition notification per slot whose observed status changed, so a
    /// single tick produces at most two.
    pub async fn tick(&mut self, notifier: &dyn Notify) -> Option<&P> {
        let health = self.primary.probe().await;
        metrics::record_probe(NodeRole::Primary, &health);
        if self.primary_status != Some(health.status) {
            notifier
                .notify(&transition_message(NodeRole::Primary, &health))
                .await;
            self.primary_status = Some(health.status);
        }
        if health.is_healthy() {
            metrics::record_active_pair(Some(NodeRole::Primary));
            return Some(&self.primary);
        }

        warn!(status = health.status.label(), "primary node unhealthy, probing fallback");
        let fallback_health = self.fallback.probe().await;
        metrics::record_probe(NodeRole::Fallback, &fallback_health);
        if self.fallback_status != Some(fallback_health.status) {
            notifier
                .notify(&transition_message(NodeRole::Fallback, &fallback_health))
                .await;
            self.fallback_status = Some(fallback_health.status);
        }
        if fallback_health.is_healthy() {
            metrics::record_active_pair(Some(NodeRole::Fallback));
            return Some(&self.fallback);
        }

        error!(
            primary = health.status.label(),
            fallback = fallback_health.status.label(),
            "both primary and fallback nodes are unhealthy"
        );
        metrics::record_active_pair(None);
        None
    }
}
