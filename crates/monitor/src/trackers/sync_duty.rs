//! Sync-committee duty lifecycle across committee periods.
//!
//! Duties are discovered for the *next* period so holders get warning before
//! the committee starts. Each duty carries three one-shot notification flags;
//! flags only ever go false to true, and a duty whose end has been announced
//! is dropped from the store.

use crate::notify::Notify;
use beacon_client::BeaconClient;
use std::collections::{
    HashMap,
    HashSet,
};
use tracing::{
    debug,
    error,
    info,
};

pub const EPOCHS_PER_SYNC_COMMITTEE_PERIOD: u64 = 256;

/// How many epochs ahead of a duty's start the "starts soon" reminder fires.
const UPCOMING_NOTIFICATION_EPOCH_THRESHOLD: u64 = 15;

/// Wall-clock length of one epoch, for the human-readable lead estimate.
const EPOCH_DURATION_MINUTES: f64 = 6.4;

#[derive(Debug, Clone)]
struct SyncDuty {
    end_epoch: u64,
    notified_initial: bool,
    notified_upcoming: bool,
    notified_end: bool,
}

pub struct SyncDutyTracker {
    monitored: HashSet<u64>,
    /// Tracked duties keyed by (validator index, committee start epoch).
    duties: HashMap<(u64, u64), SyncDuty>,
}

impl SyncDutyTracker {
    pub fn new(monitored: impl IntoIterator<Item = u64>) -> Self {
        Self {
            monitored: monitored.into_iter().collect(),
            duties: HashMap::new(),
        }
    }

    pub fn tracked_count(&self) -> usize {
        self.duties.len()
    }

    /// Discover duties for the upcoming committee period, then walk every
    /// tracked duty's notification lifecycle.
    pub async fn run(&mut self, current_epoch: u64, beacon: &BeaconClient, notifier: &dyn Notify) {
        let next_period_start = (current_epoch / EPOCHS_PER_SYNC_COMMITTEE_PERIOD + 1)
            * EPOCHS_PER_SYNC_COMMITTEE_PERIOD;
        if !self
            .duties
            .keys()
            .any(|&(_, start)| start == next_period_start)
        {
            self.discover(next_period_start, beacon).await;
        }

        let mut ended = Vec::new();
        for (&(validator_index, start_epoch), duty) in &mut self.duties {
            if !duty.notified_initial {
                notifier
                    .notify(&format!(
                        "✅ *New Sync Duty Assigned*\n\nValidator `{validator_index}` duty: `{start_epoch}` to `{}`",
                        duty.end_epoch
                    ))
                    .await;
                duty.notified_initial = true;
            }

            if !duty.notified_upcoming
                && start_epoch > current_epoch
                && start_epoch - current_epoch <= UPCOMING_NOTIFICATION_EPOCH_THRESHOLD
            {
                let epochs_until_start = start_epoch - current_epoch;
                let minutes = epochs_until_start as f64 * EPOCH_DURATION_MINUTES;
                notifier
                    .notify(&format!(
                        "⏰ *Upcoming Sync Duty*\n\nValidator `{validator_index}` starts in `{epochs_until_start}` epochs (~{minutes:.1} mins)."
                    ))
                    .await;
                duty.notified_upcoming = true;
            }

            if !duty.notified_end && current_epoch > duty.end_epoch {
                notifier
                    .notify(&format!(
                        "🏁 *Sync Duty Ended*\n\nDuty for validator `{validator_index}` (started `{start_epoch}`) has ended."
                    ))
                    .await;
                duty.notified_end = true;
            }

            if duty.notified_end {
                ended.push((validator_index, start_epoch));
            }
        }

        for key in ended {
            info!(
                validator_index = key.0,
                start_epoch = key.1,
                "sync duty finished, dropping"
            );
            self.duties.remove(&key);
        }
    }

    async fn discover(&mut self, period_start: u64, beacon: &BeaconClient) {
        let mut indices: Vec<u64> = self.monitored.iter().copied().collect();
        indices.sort_unstable();

        match beacon.sync_duties(period_start, &indices).await {
            Ok(Some(duties)) => {
                for duty in duties {
                    if !self.monitored.contains(&duty.validator_index) {
                        continue;
                    }
                    self.duties
                        .entry((duty.validator_index, period_start))
                        .or_insert_with(|| SyncDuty {
                            end_epoch: period_start + EPOCHS_PER_SYNC_COMMITTEE_PERIOD,
                            notified_initial: false,
                            notified_upcoming: false,
                            notified_end: false,
                        });
                }
            }
            // The node cannot answer for periods this far out yet; duties will
            // show up on a later pass.
            Ok(None) => debug!(period_start, "sync duties not yet available"),
            Err(err) => error!(period_start, error = %err, "failed to fetch sync duties"),
        }
    }

    #[cfg(test)]
    fn insert_duty(&mut self, validator_index: u64, start_epoch: u64) {
        self.duties.insert(
            (validator_index, start_epoch),
            SyncDuty {
                end_epoch: start_epoch + EPOCHS_PER_SYNC_COMMITTEE_PERIOD,
                notified_initial: false,
                notified_upcoming: false,
                notified_end: false,
            },
        );
    }
}
