//! Edge-triggered validator liveness alerts.

use crate::notify::Notify;
use beacon_client::BeaconClient;
use std::collections::HashMap;
use tracing::error;

pub struct StatusTracker {
    monitored: Vec<u64>,
    /// Last observed status per validator index. Absence counts as active so
    /// a validator seen for the first time never alerts spuriously.
    last_status: HashMap<u64, String>,
}

impl StatusTracker {
    pub fn new(monitored: impl IntoIterator<Item = u64>) -> Self {
        Self {
            monitored: monitored.into_iter().collect(),
            last_status: HashMap::new(),
        }
    }

    /// Fetch every monitored validator's status in one call and alert on each
    /// active-to-inactive flip. The stored status is overwritten either way,
    /// so a validator that stays down alerts exactly once, and one that
    /// recovers re-arms.
    pub async fn run(&mut self, beacon: &BeaconClient, notifier: &dyn Notify) {
        let infos = match beacon.validators(&self.monitored).await {
            Ok(infos) => infos,
            Err(err) => {
                error!(error = %err, "failed to fetch validator statuses");
                return;
            }
        };

        for info in infos {
            let was_active = self
                .last_status
                .get(&info.index)
                .is_none_or(|status| status.contains("active"));
            let is_active = info.status.contains("active");

            if was_active && !is_active {
                notifier
                    .notify(&format!(
                        "🚨 *VALIDATOR OFFLINE* 🚨\n\nIndex: `{}`\nStatus: `{}`",
                        info.index,
                        humanize_status(&info.status)
                    ))
                    .await;
            }
            self.last_status.insert(info.index, info.status);
        }
    }
}

/// "exited_unslashed" -> "Exited Unslashed".
fn humanize_status(status: &str) -> String {
    status
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingNotifier;
    use serde_json::json;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{
            method,
            path,
        },
    };

    async fn mount_statuses(server: &MockServer, statuses: &[(u64, &str)], times: u64) {
        let data: Vec<_> = statuses
            .iter()
            .map(|(index, status)| {
                json!({ "index": index.to_string(), "status": status, "validator": {} })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/validators"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .up_to_n_times(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn alerts_only_on_the_flip_to_inactive() {
        let server = MockServer::start().await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut tracker = StatusTracker::new([7]);

        mount_statuses(&server, &[(7, "active_ongoing")], 1).await;
        tracker.run(&beacon, &notifier).await;
        assert!(notifier.messages().is_empty());

        mount_statuses(&server, &[(7, "exited_unslashed")], 2).await;
        tracker.run(&beacon, &notifier).await;
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("VALIDATOR OFFLINE"));
        assert!(messages[0].contains("Exited Unslashed"));

        // Still inactive: no re-alert.
        tracker.run(&beacon, &notifier).await;
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn never_seen_validator_defaults_to_active() {
        let server = MockServer::start().await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut tracker = StatusTracker::new([7]);

        // First ever observation is already inactive: that is a flip from the
        // assumed-active default.
        mount_statuses(&server, &[(7, "pending_queued")], 1).await;
        tracker.run(&beacon, &notifier).await;
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn recovery_rearms_the_alert() {
        let server = MockServer::start().await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut tracker = StatusTracker::new([7]);

        mount_statuses(&server, &[(7, "exited_unslashed")], 1).await;
        tracker.run(&beacon, &notifier).await;
        assert_eq!(notifier.messages().len(), 1);

        mount_statuses(&server, &[(7, "active_ongoing")], 1).await;
        tracker.run(&beacon, &notifier).await;
        assert_eq!(notifier.messages().len(), 1);

        mount_statuses(&server, &[(7, "exited_slashed")], 1).await;
        tracker.run(&beacon, &notifier).await;
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn active_substatuses_do_not_alert() {
        let server = MockServer::start().await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut tracker = StatusTracker::new([7, 8]);

        mount_statuses(
            &server,
            &[(7, "active_ongoing"), (8, "active_exiting")],
            1,
        )
        .await;
        tracker.run(&beacon, &notifier).await;
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_leaves_state_untouched() {
        let server = MockServer::start().await;
        let beacon = BeaconClient::new(server.uri().parse().unwrap()).unwrap();
        let notifier = RecordingNotifier::default();
        let mut tracker = StatusTracker::new([7]);

        mount_statuses(&server, &[(7, "active_ongoing")], 1).await;
        tracker.run(&beacon, &notifier).await;

        Mock::given(method("GET"))
            .and(path("/eth/v1/beacon/states/head/validators"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        tracker.run(&beacon, &notifier).await;
        assert!(notifier.messages().is_empty());

        // Next successful fetch still compares against the pre-failure state.
        mount_statuses(&server, &[(7, "exited_unslashed")], 1).await;
        tracker.run(&beacon, &notifier).await;
        assert_eq!(notifier.messages().len(), 1);
    }

    #[test]
    fn status_humanization() {
        assert_eq!(humanize_status("exited_unslashed"), "Exited Unslashed");
        assert_eq!(humanize_status("active_ongoing"), "Active Ongoing");
        assert_eq!(humanize_status("pending"), "Pending");
    }
}
