//! The periodic driver. One sequential tick: arbitrate node health, fetch the
//! head slot once, then hand (slot, epoch) to each duty tracker. Ticks never
//! overlap; a tick that overruns the interval just delays the next one.

use crate::{
    failover::FailoverArbiter,
    metrics,
    notify::Notify,
    probe::NodePair,
    trackers::{
        ProposalTracker,
        StatusTracker,
        SyncDutyTracker,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::broadcast,
    time::{
        self,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

pub const SLOTS_PER_EPOCH: u64 = 32;

/// Validator statuses change slowly; sample them every fifth slot.
const STATUS_CHECK_SLOT_MODULUS: u64 = 5;

/// Sync-committee membership changes even more slowly; once per epoch.
const SYNC_DUTY_CHECK_SLOT_MODULUS: u64 = 32;

pub struct MonitorLoop {
    arbiter: FailoverArbiter<NodePair>,
    proposals: ProposalTracker,
    sync_duties: SyncDutyTracker,
    statuses: StatusTracker,
    notifier: Arc<dyn Notify>,
    interval: Duration,
}

impl MonitorLoop {
    pub fn new(
        primary: NodePair,
        fallback: NodePair,
        monitored: &[u64],
        notifier: Arc<dyn Notify>,
        interval: Duration,
    ) -> Self {
        Self {
            arbiter: FailoverArbiter::new(primary, fallback),
            proposals: ProposalTracker::new(monitored.iter().copied()),
            sync_duties: SyncDutyTracker::new(monitored.iter().copied()),
            statuses: StatusTracker::new(monitored.iter().copied()),
            notifier,
            interval,
        }
    }

    /// Tick until shutdown is signalled. The in-flight tick always runs to
    /// completion; the signal is only observed between ticks.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping monitor loop");
                    return;
                }
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }
    }

    /// One full pass: arbitration, head fetch, duty trackers.
    pub async fn tick(&mut self) {
        metrics::record_tick();

        let Some(pair) = self.arbiter.tick(self.notifier.as_ref()).await else {
            info!("no healthy node pair available, skipping validator checks");
            return;
        };
        // An active pair is healthy, and a healthy probe implies both clients
        // are configured.
        let (Some(beacon), Some(execution)) = (pair.beacon(), pair.execution()) else {
            return;
        };

        let slot = match beacon.head_slot().await {
            Ok(slot) => slot,
            Err(err) => {
                warn!(error = %err, "failed to fetch head slot, skipping tick");
                return;
            }
        };
        let epoch = slot / SLOTS_PER_EPOCH;
        debug!(slot, epoch, node = pair.role().label(), "running validator checks");

        self.proposals
            .resolve_pending(slot, beacon, execution, self.notifier.as_ref())
            .await;
        self.proposals
            .record_upcoming(epoch, beacon, self.notifier.as_ref())
            .await;

        if slot % STATUS_CHECK_SLOT_MODULUS == 0 {
            self.statuses.run(beacon, self.notifier.as_ref()).await;
        }
        if slot % SYNC_DUTY_CHECK_SLOT_MODULUS == 0 {
            self.sync_duties
                .run(epoch, beacon, self.notifier.as_ref())
                .await;
        }
    }
}
