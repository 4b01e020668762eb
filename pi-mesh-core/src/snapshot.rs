//! Point-in-time view of a node for rendering
//!
//! A [`TableSnapshot`] copies everything the terminal table shows, so the
//! renderer never borrows the live node. Snapshots are serde types and can be
//! shipped as postcard bytes.

use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use crate::codec::Accuracy;
use crate::round::Phase;
use crate::traits::{Millis, NodeId};

/// One Node Table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Node the row belongs to
    pub id: NodeId,
    /// Heard from within the idle threshold
    pub active: bool,
    /// Local clock when the node was last heard
    pub last_local_time: Millis,
    /// Position in the active set, zero if unsequenced
    pub sequence: u32,
    /// Spam-guard counter
    pub ping_count: u16,
    /// Round of the last Result
    pub round: u32,
    /// Hits reported for that round
    pub result: u32,
}

/// Whole-node snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Local clock when the snapshot was taken
    pub taken_at: Millis,
    pub local: NodeId,
    pub target: Accuracy,
    pub version: u32,
    pub round: u32,
    pub phase: Phase,
    pub estimate: f64,
    pub current_accuracy: f32,
    /// Elapsed so far, or frozen once complete
    pub run_time: Millis,
    /// `sequenced × local round × samples per cycle`
    pub points_generated: u64,
    /// Rows in discovery order, local first
    pub rows: Vec<RowSnapshot>,
}

impl TableSnapshot {
    /// Serialize to postcard bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserialize from postcard bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Number of rows marked active
    pub fn active_count(&self) -> usize {
        self.rows.iter().filter(|row| row.active).count()
    }
}
