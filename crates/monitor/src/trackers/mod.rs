//! The three independent duty-lifecycle trackers. Each owns its in-memory
//! store and is only ever driven by the sequential monitoring tick, so none
//! of them need interior locking.

pub mod proposals;
pub mod status;
pub mod sync_duty;

pub use proposals::ProposalTracker;
pub use status::StatusTracker;
pub use sync_duty::SyncDutyTracker;
