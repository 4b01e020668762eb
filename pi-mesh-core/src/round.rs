//! Round state machine
//!
//! Owns "which calculation is running": the target accuracy, the version that
//! identifies the calculation across the mesh, and the round counter within
//! it. Nothing else writes those three.
//!
//! ```text
//!            Distribute / newer Result
//!   Idle ─────────────────────────────▶ Running ──target reached──▶ Complete
//!                                        ▲   │                         │
//!                                        └───┘ round compiled          │
//!                 Distribute / newer Result (full reset)               │
//!   Running/Complete ◀─────────────────────────────────────────────────┘
//! ```
//!
//! A higher version always wins: admitting it performs a full reset, which
//! cancels whatever round was in flight.

use serde::{Deserialize, Serialize};

use crate::codec::{Accuracy, Distribute, ResultPacket};
use crate::sequencer::sequence_nodes;
use crate::table::NodeTable;
use crate::traits::{Millis, NodeId};
use crate::Rejection;

/// Version value reserved for counter saturation
pub const SATURATED_VERSION: u32 = u32::MAX;

/// Lifecycle of the current calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No calculation context yet (fresh or hot-added board)
    Idle,
    /// Rounds are being sampled and compiled
    Running,
    /// Target accuracy reached; state frozen until the next version
    Complete,
}

/// Per-cycle sampling counters of the local node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleCounters {
    /// Trials that landed inside
    pub inside: u32,
    /// Trials run
    pub generated: u32,
}

/// How an incoming Result relates to the local calculation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Same version as ours
    Current,
    /// Newer version: adopt it
    Newer,
}

/// Process-wide calculation state
#[derive(Debug, Clone)]
pub struct RoundState {
    target: Accuracy,
    target_percent: f32,
    version: u32,
    round: u32,
    phase: Phase,
    pub(crate) current_accuracy: f32,
    pub(crate) cumulative_inside: u64,
    pub(crate) cycle: CycleCounters,
    pub(crate) estimate: f64,
    pub(crate) sequenced: u32,
    run_start: Millis,
    pub(crate) run_elapsed: Option<Millis>,
}

impl RoundState {
    /// Idle state of a freshly booted node
    pub fn new(now: Millis) -> Self {
        Self {
            target: Accuracy::default(),
            target_percent: 0.0,
            version: 0,
            round: 0,
            phase: Phase::Idle,
            current_accuracy: 0.0,
            cumulative_inside: 0,
            cycle: CycleCounters::default(),
            estimate: 0.0,
            sequenced: 1,
            run_start: now,
            run_elapsed: None,
        }
    }

    /// Target accuracy as it travels on the wire
    pub fn target(&self) -> Accuracy {
        self.target
    }

    /// Target accuracy in percent
    pub fn target_percent(&self) -> f32 {
        self.target_percent
    }

    /// Calculation version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Round counter within the version
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Accuracy achieved by the last compiled round
    pub fn current_accuracy(&self) -> f32 {
        self.current_accuracy
    }

    /// Inside-count summed over every compiled round
    pub fn cumulative_inside(&self) -> u64 {
        self.cumulative_inside
    }

    /// Local sampling counters for this cycle
    pub fn cycle(&self) -> CycleCounters {
        self.cycle
    }

    /// Derived estimate of the constant
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Rows sequenced at the last reset; divisor basis of the estimate
    pub fn sequenced(&self) -> u32 {
        self.sequenced
    }

    /// Local clock when the running calculation started
    pub fn run_start(&self) -> Millis {
        self.run_start
    }

    /// Run time: frozen once complete, elapsed so far otherwise
    pub fn run_time(&self, now: Millis) -> Millis {
        self.run_elapsed
            .unwrap_or_else(|| now.saturating_sub(self.run_start))
    }

    /// Check a Distribute and return the version it would start
    ///
    /// Rejected requests leave no trace on the state.
    pub fn admit_distribute(&self, packet: &Distribute, threshold: f32) -> Result<u32, Rejection> {
        let requested = packet.accuracy.percent();
        if !(0.0..=threshold).contains(&requested) {
            return Err(Rejection::AccuracyOutOfRange {
                requested: packet.accuracy,
            });
        }
        match self.version.checked_add(1) {
            Some(next) if next != SATURATED_VERSION => Ok(next),
            _ => Err(Rejection::VersionExhausted),
        }
    }

    /// Classify a Result by its version
    pub fn classify(&self, packet: &ResultPacket) -> Result<Verdict, Rejection> {
        if packet.version < self.version {
            return Err(Rejection::Stale {
                version: packet.version,
                current: self.version,
            });
        }
        if packet.version == SATURATED_VERSION {
            return Err(Rejection::VersionSaturated { node: packet.node });
        }
        if packet.version > self.version {
            Ok(Verdict::Newer)
        } else {
            Ok(Verdict::Current)
        }
    }

    /// True when `sender_round` is more than one step from our round
    pub fn is_hot_swap(&self, sender_round: u32) -> bool {
        sender_round.abs_diff(self.round) > 1
    }

    /// Start the next round of the same version, dropping per-cycle counts
    pub(crate) fn advance_round(&mut self) {
        self.round += 1;
        self.cycle = CycleCounters::default();
    }

    pub(crate) fn complete(&mut self, now: Millis) {
        self.phase = Phase::Complete;
        self.run_elapsed = Some(now.saturating_sub(self.run_start));
    }

    fn begin(&mut self, target: Accuracy, version: u32, sequenced: u32, now: Millis) {
        *self = Self {
            target,
            target_percent: target.percent(),
            version,
            round: 1,
            phase: Phase::Running,
            sequenced,
            ..Self::new(now)
        };
    }
}

/// Full reset onto calculation `version` with `target`
///
/// Clears the sequence, round and result columns of the table, re-sequences
/// the active set and restarts the run clock.
pub fn reset_calculation(
    state: &mut RoundState,
    table: &mut NodeTable,
    active: &[NodeId],
    target: Accuracy,
    version: u32,
    now: Millis,
) {
    table.clear_calculation();
    let sequenced = sequence_nodes(table, active);
    state.begin(target, version, sequenced, now);
    tracing::info!(version, target = %target, sequenced, "calculation admitted");
}
