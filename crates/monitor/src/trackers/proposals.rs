//! Block-proposal lifecycle: announce upcoming duties, then confirm or flag
//! them once their slot has passed.
//!
//! A proposal is only confirmable one slot after it was scheduled, so entries
//! sit in the pending store until the observed head moves past them. Removal
//! happens exactly once per entry, whether or not resolution succeeded; a slot
//! that has passed will never become resolvable later, so there is nothing to
//! retry.

use crate::{
    execution::ExecutionClient,
    notify::Notify,
};
use alloy_primitives::U256;
use anyhow::{
    Context,
    Result,
};
use beacon_client::{
    BeaconClient,
    ExecutionPayload,
    decode_graffiti,
};
use std::collections::{
    BTreeMap,
    HashSet,
};
use tracing::{
    debug,
    error,
    info,
};

pub struct ProposalTracker {
    monitored: HashSet<u64>,
    /// Scheduled-but-unconfirmed proposals, keyed by slot.
    pending: BTreeMap<u64, u64>,
}

impl ProposalTracker {
    pub fn new(monitored: impl IntoIterator<Item = u64>) -> Self {
        Self {
            monitored: monitored.into_iter().collect(),
            pending: BTreeMap::new(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Query proposer duties for `epoch` and announce any monitored validator
    /// whose assigned slot is not already tracked.
    pub async fn record_upcoming(
        &mut self,
        epoch: u64,
        beacon: &BeaconClient,
        notifier: &dyn Notify,
    ) {
        let duties = match beacon.proposer_duties(epoch).await {
            Ok(duties) => duties,
            Err(err) => {
                error!(epoch, error = %err, "failed to fetch proposer duties");
                return;
            }
        };

        for duty in duties {
            if !self.monitored.contains(&duty.validator_index)
                || self.pending.contains_key(&duty.slot)
            {
                continue;
            }
            self.pending.insert(duty.slot, duty.validator_index);
            info!(
                slot = duty.slot,
                validator_index = duty.validator_index,
                "tracking upcoming proposal"
            );
            notifier
                .notify(&format!(
                    "🔔 *Upcoming Proposal* 🔔\n\nValidator `{}` to propose block at slot `{}`.",
                    duty.validator_index, duty.slot
                ))
                .await;
        }
    }

    /// Resolve every pending proposal whose slot the chain head has passed.
    /// Entries are removed up front so a failed resolution is never retried.
    pub async fn resolve_pending(
        &mut self,
        current_slot: u64,
        beacon: &BeaconClient,
        execution: &ExecutionClient,
        notifier: &dyn Notify,
    ) {
        let not_yet_due = self.pending.split_off(&current_slot);
        let due = std::mem::replace(&mut self.pending, not_yet_due);

        for (slot, validator_index) in due {
            debug!(slot, validator_index, "resolving proposal");
            if let Err(err) = resolve_one(slot, validator_index, beacon, execution, notifier).await
            {
                error!(
                    slot,
                    validator_index,
                    error = %err,
                    "failed to resolve proposal, dropping it"
                );
            }
        }
    }
}

async fn resolve_one(
    slot: u64,
    validator_index: u64,
    beacon: &BeaconClient,
    execution: &ExecutionClient,
    notifier: &dyn Notify,
) -> Result<()> {
    let block = beacon
        .block_at_slot(slot)
        .await
        .context("block lookup failed")?;

    let Some(block) = block else {
        notifier
            .notify(&format!(
                "❌ *MISSED PROPOSAL* ❌\n\nValidator `{validator_index}` missed proposal at slot `{slot}`."
            ))
            .await;
        return Ok(());
    };

    let reward = proposal_reward(execution, &block.body.execution_payload)
        .await
        .context("reward computation failed")?;
    let graffiti = decode_graffiti(&block.body.graffiti);

    notifier
        .notify(&format!(
            "🎉 *PROPOSAL CONFIRMED* 🎉\n\nValidator `{validator_index}` proposed block at slot `{slot}`.\n💰 *Reward:* `{reward:.6} ETH`\n🛰️ *Graffiti:* `{graffiti}`"
        ))
        .await;
    Ok(())
}

/// The proposer's take is what actually settled on the fee-recipient account:
/// its balance delta across the block. The in-block "value" field is not
/// consulted.
async fn proposal_reward(
    execution: &ExecutionClient,
    payload: &ExecutionPayload,
) -> Result<f64> {
    let before = execution
        .balance_at(payload.fee_recipient, payload.block_number.saturating_sub(1))
        .await?;
    let after = execution
        .balance_at(payload.fee_recipient, payload.block_number)
        .await?;
    Ok(wei_to_eth(after.saturating_sub(before)))
}

pub(crate) fn wei_to_eth(wei: U256) -> f64 {
    // Saturates far beyond any single-block reward.
    let wei = u128::try_from(wei).unwrap_or(u128::MAX);
    wei as f64 / 1e18
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
            body_partial_json,
            method,
            path,
        },
    };

    const ONE_ETH_HEX: &str = "0xde0b6b3a7640000";
    const ONE_POINT_O_FIVE_ETH_HEX: &str = "0xe92596fd6290000";

    async fn clients(
        beacon: &MockServer,
        execution: &MockServer,
    ) -> (BeaconClient, ExecutionClient) {
        (
            BeaconClient::new(beacon.uri().parse().unwrap()).unwrap(),
            ExecutionClient::new(execution.uri().parse().unwrap()).unwrap(),
        )
    }

    async fn mount_duties(server: &MockServer, epoch: u64, duties: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/eth/v1/validator/duties/proposer/{epoch}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": duties })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn upcoming_duties_are_announced_once() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, _) = clients(&beacon, &execution).await;
        mount_duties(
            &beacon,
            100,
            json!([
                { "pubkey": "0xaa", "validator_index": "7", "slot": "3205" },
                { "pubkey": "0xbb", "validator_index": "999", "slot": "3210" }
            ]),
        )
        .await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);

        tracker.record_upcoming(100, &beacon_client, &notifier).await;
        assert_eq!(tracker.pending_count(), 1);
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Validator `7`"));
        assert!(messages[0].contains("slot `3205`"));

        // Same epoch queried again: the duty is already tracked.
        tracker.record_upcoming(100, &beacon_client, &notifier).await;
        assert_eq!(tracker.pending_count(), 1);
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn duty_query_failure_leaves_store_untouched() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, _) = clients(&beacon, &execution).await;
        Mock::given(method("GET"))
            .and(path("/eth/v1/validator/duties/proposer/100"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&beacon)
            .await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);
        tracker.record_upcoming(100, &beacon_client, &notifier).await;

        assert_eq!(tracker.pending_count(), 0);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn missed_proposal_notifies_and_removes() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, execution_client) = clients(&beacon, &execution).await;
        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/3205"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&beacon)
            .await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);
        tracker.pending.insert(3205, 7);

        tracker
            .resolve_pending(3206, &beacon_client, &execution_client, &notifier)
            .await;

        assert_eq!(tracker.pending_count(), 0);
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("MISSED PROPOSAL"));
        assert!(messages[0].contains("slot `3205`"));
    }

    #[tokio::test]
    async fn confirmed_proposal_reports_balance_delta_and_graffiti() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, execution_client) = clients(&beacon, &execution).await;

        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/3205"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "message": {
                    "slot": "3205",
                    "proposer_index": "7",
                    "body": {
                        "graffiti": "0x4c69676874686f75736500000000000000000000000000000000000000000000",
                        "execution_payload": {
                            "block_number": "100",
                            "block_hash": "0x2222222222222222222222222222222222222222222222222222222222222222",
                            "fee_recipient": "0x0000000000000000000000000000000000000000"
                        }
                    }
                } }
            })))
            .mount(&beacon)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getBalance",
                "params": ["0x0000000000000000000000000000000000000000", "0x63"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": ONE_ETH_HEX
            })))
            .mount(&execution)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_getBalance",
                "params": ["0x0000000000000000000000000000000000000000", "0x64"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 2, "result": ONE_POINT_O_FIVE_ETH_HEX
            })))
            .mount(&execution)
            .await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);
        tracker.pending.insert(3205, 7);

        tracker
            .resolve_pending(3206, &beacon_client, &execution_client, &notifier)
            .await;

        assert_eq!(tracker.pending_count(), 0);
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("PROPOSAL CONFIRMED"));
        assert!(messages[0].contains("0.050000 ETH"));
        assert!(messages[0].contains("Lighthouse"));
    }

    #[tokio::test]
    async fn skipped_slots_still_resolve() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, execution_client) = clients(&beacon, &execution).await;
        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/3205"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&beacon)
            .await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);
        tracker.pending.insert(3205, 7);

        // Polling skipped straight past 3206; the entry must still settle.
        tracker
            .resolve_pending(3209, &beacon_client, &execution_client, &notifier)
            .await;

        assert_eq!(tracker.pending_count(), 0);
        assert_eq!(notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn future_slots_stay_pending() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, execution_client) = clients(&beacon, &execution).await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);
        tracker.pending.insert(3205, 7);

        tracker
            .resolve_pending(3205, &beacon_client, &execution_client, &notifier)
            .await;

        assert_eq!(tracker.pending_count(), 1);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn resolution_errors_still_remove_the_entry() {
        let beacon = MockServer::start().await;
        let execution = MockServer::start().await;
        let (beacon_client, execution_client) = clients(&beacon, &execution).await;
        Mock::given(method("GET"))
            .and(path("/eth/v2/beacon/blocks/3205"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&beacon)
            .await;

        let notifier = RecordingNotifier::default();
        let mut tracker = ProposalTracker::new([7]);
        tracker.pending.insert(3205, 7);

        tracker
            .resolve_pending(3206, &beacon_client, &execution_client, &notifier)
            .await;

        // Dropped without a notification: the slot will never become
        // resolvable, and a false "missed" alarm would be wrong.
        assert_eq!(tracker.pending_count(), 0);
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn reward_is_the_unit_converted_balance_delta() {
        let before = U256::from(10u64).pow(U256::from(18));
        let after = before + U256::from(5u64) * U256::from(10u64).pow(U256::from(16));
        let reward = wei_to_eth(after.saturating_sub(before));
        assert!((reward - 0.05).abs() < 1e-12);
    }

    #[test]
    fn negative_deltas_saturate_to_zero() {
        let before = U256::from(10u64).pow(U256::from(18));
        let after = U256::from(1u64);
        assert_eq!(wei_to_eth(after.saturating_sub(before)), 0.0);
    }
}
