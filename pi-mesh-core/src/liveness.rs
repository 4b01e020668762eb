//! Liveness monitor
//!
//! Polled once per heartbeat: every remote node is active iff it was heard
//! from within the idle threshold. The monitor is the only writer of the
//! `active` column and keeps the active set the Sequencer consumes on the
//! next calculation reset.

use alloc::vec::Vec;

use crate::table::{NodeTable, LOCAL_SLOT};
use crate::traits::{Millis, NodeId};

/// Joins and departures seen by one liveness pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    /// Nodes that became active
    pub joined: Vec<NodeId>,
    /// Nodes that became inactive
    pub left: Vec<NodeId>,
}

impl LivenessReport {
    /// True when no node changed state
    pub fn is_quiet(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

/// Heartbeat-driven liveness tracker
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    active_set: Vec<NodeId>,
}

impl LivenessMonitor {
    /// Create a monitor whose active set holds only the local node
    pub fn new(local: NodeId) -> Self {
        Self {
            active_set: alloc::vec![local],
        }
    }

    /// Ids active as of the last pass, local node first
    pub fn active_set(&self) -> &[NodeId] {
        &self.active_set
    }

    /// Number of active nodes, local included
    pub fn active_count(&self) -> usize {
        self.active_set.len()
    }

    /// Re-evaluate every remote node against the local clock
    ///
    /// Inactive nodes lose their stored result and ping count so stale data
    /// cannot leak into a later aggregation.
    pub fn refresh(&mut self, table: &mut NodeTable, now: Millis) -> LivenessReport {
        let mut report = LivenessReport::default();
        let idle_threshold = table.idle_threshold();
        self.active_set.clear();

        for (slot, node) in table.nodes_mut().iter_mut().enumerate() {
            if slot == LOCAL_SLOT {
                self.active_set.push(node.id());
                continue;
            }

            let was_active = node.is_active();
            let active = now.saturating_sub(node.last_local_time()) < idle_threshold;
            node.set_active(active);

            if active {
                self.active_set.push(node.id());
            } else {
                node.forget_result();
            }

            match (was_active, active) {
                (false, true) => {
                    tracing::info!(node = %node.id(), "node joined the mesh");
                    report.joined.push(node.id());
                }
                (true, false) => {
                    tracing::info!(node = %node.id(), "node left the mesh");
                    report.left.push(node.id());
                }
                _ => {}
            }
        }

        report
    }
}
