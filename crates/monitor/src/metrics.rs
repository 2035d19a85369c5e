//! Service metrics emitted through the `metrics` facade.
//!
//! Exporter wiring is an operator concern; nothing here assumes a recorder is
//! installed.

use crate::probe::{
    NodeHealth,
    NodeRole,
};
use metrics::{
    counter,
    gauge,
};

/// Record the outcome of one node-pair probe.
pub fn record_probe(role: NodeRole, health: &NodeHealth) {
    let node = role.label();
    gauge!("stakewatch_node_healthy", "node" => node)
        .set(if health.is_healthy() { 1.0 } else { 0.0 });
    counter!("stakewatch_probes_total", "node" => node, "status" => health.status.label())
        .increment(1);
}

/// Record which pair (if any) is serving validator checks this tick.
pub fn record_active_pair(active: Option<NodeRole>) {
    let value = match active {
        Some(NodeRole::Primary) => 1.0,
        Some(NodeRole::Fallback) => 2.0,
        None => 0.0,
    };
    gauge!("stakewatch_active_pair").set(value);
}

/// Count one successfully delivered notification.
pub fn record_notification() {
    counter!("stakewatch_notifications_total").increment(1);
}

/// Count one completed monitoring tick.
pub fn record_tick() {
    counter!("stakewatch_ticks_total").increment(1);
}
