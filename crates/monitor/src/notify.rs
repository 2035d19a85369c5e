//! Outbound notification seam shared by every monitoring component.

use crate::{
    probe::{
        NodeHealth,
        NodeRole,
    },
    telegram::TelegramClient,
};
use async_trait::async_trait;
use tracing::{
    error,
    info,
};

/// Best-effort broadcast of one human-readable alert.
///
/// Implementations must never block the monitoring tick on delivery problems:
/// failures are logged and swallowed, and the condition naturally re-reports
/// on a later state change if it still matters.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, text: &str);
}

/// Delivery over the Telegram Bot API.
pub struct TelegramNotifier {
    client: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn notify(&self, text: &str) {
        match self.client.send_message(text).await {
            Ok(()) => {
                info!(message = text, "sent notification");
                crate::metrics::record_notification();
            }
            Err(err) => error!(error = %err, "failed to send notification"),
        }
    }
}

/// The one place node-health transition wording is produced, so identical
/// statuses always render identically regardless of which component reports
/// them.
pub fn transition_message(role: NodeRole, health: &NodeHealth) -> String {
    let status = health.status.describe();
    match (role, health.is_healthy()) {
        (NodeRole::Primary, true) => format!("✅ *Primary Node Recovered*\nStatus: {status}"),
        (NodeRole::Primary, false) => format!("🚨 *Primary Node Unhealthy*\nStatus: {status}"),
        (NodeRole::Fallback, true) => {
            format!("✅ *Failing over to Fallback Node*\nStatus: {status}")
        }
        (NodeRole::Fallback, false) => format!("🚨 *Fallback Node Unhealthy*\nStatus: {status}"),
    }
}
