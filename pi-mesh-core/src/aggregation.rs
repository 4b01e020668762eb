//! Aggregation of per-node partial counts
//!
//! Every heartbeat the Aggregator tries to compile the current round: once
//! every sequenced node has reported, the round's inside-counts are added to
//! the running total and the estimate is recomputed as
//!
//! ```text
//! estimate = 4 × cumulative / (sequenced × round × samples_per_cycle)
//! accuracy = 100 − |estimate − π| / π × 100
//! ```
//!
//! A round with any sequenced node still at zero is left untouched for the
//! next tick, so compiling with no new data never moves the estimate.

use core::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::round::{Phase, RoundState};
use crate::table::NodeTable;
use crate::traits::Millis;

/// Direction of the accuracy relative to the previous round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// Accuracy held or improved
    Improving,
    /// Accuracy dropped
    Regressing,
}

/// What a compile attempt did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompileOutcome {
    /// No calculation has been admitted
    Idle,
    /// Target already reached; nothing to do
    AlreadyComplete,
    /// The local node has not reported for this round yet
    AwaitingLocal,
    /// Some sequenced nodes have not reported
    Incomplete {
        /// Sequenced rows still at zero
        missing: usize,
    },
    /// Round compiled; the next one begins
    NextRound {
        /// Round that was compiled
        round: u32,
        /// Updated estimate
        estimate: f64,
        /// Updated accuracy
        accuracy: f32,
        /// Change against the previous accuracy
        trend: Trend,
    },
    /// Round compiled and the target reached
    Complete {
        /// Final estimate
        estimate: f64,
        /// Final accuracy
        accuracy: f32,
        /// Run time of the calculation
        elapsed: Millis,
    },
}

/// Estimate from the running inside-count
///
/// Returns 0 when the divisor is zero.
pub fn estimate(cumulative: u64, sequenced: u32, round: u32, samples_per_cycle: u32) -> f64 {
    let points = u64::from(sequenced) * u64::from(round) * u64::from(samples_per_cycle);
    if points == 0 {
        return 0.0;
    }
    4.0 * (cumulative as f64 / points as f64)
}

/// Accuracy of `estimate` against π, in percent
pub fn accuracy_of(estimate: f64) -> f32 {
    let error = estimate - PI;
    let error = if error < 0.0 { -error } else { error };
    (100.0 - error / PI * 100.0) as f32
}

/// Round compiler
#[derive(Debug, Clone)]
pub struct Aggregator {
    samples_per_cycle: u32,
}

impl Aggregator {
    /// Create an aggregator for the given per-cycle quota
    pub fn new(samples_per_cycle: u32) -> Self {
        Self { samples_per_cycle }
    }

    /// Try to compile the current round
    pub fn compile(
        &self,
        table: &mut NodeTable,
        state: &mut RoundState,
        now: Millis,
    ) -> CompileOutcome {
        if state.phase() == Phase::Idle {
            return CompileOutcome::Idle;
        }
        if state.phase() == Phase::Complete || state.current_accuracy >= state.target_percent() {
            return CompileOutcome::AlreadyComplete;
        }

        let local_round = table.local().round();
        if local_round == 0 {
            return CompileOutcome::AwaitingLocal;
        }

        let mut sum: u64 = 0;
        let mut missing = 0;
        for node in table.iter().filter(|n| n.sequence() > 0) {
            if node.result() == 0 {
                missing += 1;
            } else {
                sum += u64::from(node.result());
            }
        }
        if missing > 0 {
            tracing::trace!(missing, round = state.round(), "round incomplete");
            return CompileOutcome::Incomplete { missing };
        }

        state.cumulative_inside += sum;
        state.estimate = estimate(
            state.cumulative_inside,
            state.sequenced(),
            local_round,
            self.samples_per_cycle,
        );

        let previous = state.current_accuracy;
        let accuracy = accuracy_of(state.estimate);
        state.current_accuracy = accuracy;
        let trend = if accuracy >= previous {
            Trend::Improving
        } else {
            Trend::Regressing
        };

        if accuracy >= state.target_percent() {
            state.complete(now);
            let elapsed = state.run_time(now);
            tracing::info!(
                version = state.version(),
                estimate = state.estimate,
                accuracy,
                elapsed,
                "target accuracy reached"
            );
            return CompileOutcome::Complete {
                estimate: state.estimate,
                accuracy,
                elapsed,
            };
        }

        let round = state.round();
        table.clear_round();
        state.advance_round();
        tracing::debug!(round, estimate = state.estimate, accuracy, "round compiled");
        CompileOutcome::NextRound {
            round,
            estimate: state.estimate,
            accuracy,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Accuracy;
    use crate::round::reset_calculation;
    use crate::table::LOCAL_SLOT;
    use crate::traits::NodeId;

    const SAMPLES: u32 = 1000;

    fn running(target: Accuracy, peers: &[u32]) -> (NodeTable, RoundState) {
        let mut table = NodeTable::new(NodeId(1), 8, 5000, 0);
        let mut active = vec![NodeId(1)];
        for &peer in peers {
            table.record_observation(NodeId(peer), 10_000, 0).unwrap();
            active.push(NodeId(peer));
        }
        let mut state = RoundState::new(0);
        reset_calculation(&mut state, &mut table, &active, target, 1, 0);
        (table, state)
    }

    #[test]
    fn estimate_is_pure_in_its_inputs() {
        assert_eq!(estimate(785, 1, 1, SAMPLES), 3.14);
        assert_eq!(estimate(1570, 2, 1, SAMPLES), 3.14);
        assert_eq!(estimate(1570, 1, 2, SAMPLES), 3.14);
        assert_eq!(estimate(100, 0, 1, SAMPLES), 0.0);
    }

    #[test]
    fn accuracy_is_symmetric_around_pi() {
        let above = accuracy_of(PI * 1.01);
        let below = accuracy_of(PI * 0.99);
        assert!((above - 99.0).abs() < 1e-3);
        assert!((below - 99.0).abs() < 1e-3);
        assert!((accuracy_of(PI) - 100.0).abs() < f32::EPSILON);
    }

    #[test]
    fn idle_state_is_not_compiled() {
        let mut table = NodeTable::new(NodeId(1), 8, 5000, 0);
        let mut state = RoundState::new(0);
        let outcome = Aggregator::new(SAMPLES).compile(&mut table, &mut state, 100);
        assert_eq!(outcome, CompileOutcome::Idle);
    }

    #[test]
    fn waits_for_local_contribution() {
        let (mut table, mut state) = running(Accuracy::new(99, 0), &[]);
        let outcome = Aggregator::new(SAMPLES).compile(&mut table, &mut state, 100);
        assert_eq!(outcome, CompileOutcome::AwaitingLocal);
    }

    #[test]
    fn incomplete_round_leaves_counters_untouched() {
        let (mut table, mut state) = running(Accuracy::new(99, 0), &[2, 3]);
        table.update_result(LOCAL_SLOT, 790, 1);
        let slot = table.slot_of(NodeId(2)).unwrap();
        table.update_result(slot, 780, 1);

        let outcome = Aggregator::new(SAMPLES).compile(&mut table, &mut state, 100);
        assert_eq!(outcome, CompileOutcome::Incomplete { missing: 1 });
        assert_eq!(state.cumulative_inside(), 0);
        assert_eq!(state.round(), 1);
        assert_eq!(table.local().result(), 790);
    }

    #[test]
    fn complete_round_advances_and_clears_rows() {
        let (mut table, mut state) = running(Accuracy::new(99, 99), &[2]);
        table.update_result(LOCAL_SLOT, 700, 1);
        let slot = table.slot_of(NodeId(2)).unwrap();
        table.update_result(slot, 700, 1);

        let aggregator = Aggregator::new(SAMPLES);
        let outcome = aggregator.compile(&mut table, &mut state, 100);
        let CompileOutcome::NextRound {
            round,
            estimate: est,
            trend,
            ..
        } = outcome
        else {
            panic!("expected next round, got {:?}", outcome);
        };
        assert_eq!(round, 1);
        assert_eq!(est, 2.8);
        assert_eq!(trend, Trend::Improving);
        assert_eq!(state.round(), 2);
        assert_eq!(state.cumulative_inside(), 1400);
        assert!(table.iter().all(|n| n.result() == 0 && n.round() == 0));

        // Nothing new arrived: compiling again changes nothing.
        let estimate_before = state.estimate();
        assert_eq!(
            aggregator.compile(&mut table, &mut state, 200),
            CompileOutcome::AwaitingLocal
        );
        assert_eq!(state.estimate(), estimate_before);
    }

    #[test]
    fn reaching_target_freezes_state() {
        let (mut table, mut state) = running(Accuracy::new(50, 0), &[]);
        table.update_result(LOCAL_SLOT, 785, 1);

        let aggregator = Aggregator::new(SAMPLES);
        let outcome = aggregator.compile(&mut table, &mut state, 1500);
        let CompileOutcome::Complete { elapsed, accuracy, .. } = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(elapsed, 1500);
        assert!(accuracy > 99.0);
        assert_eq!(state.phase(), Phase::Complete);
        assert_eq!(state.round(), 1);
        assert_eq!(table.local().result(), 785);

        assert_eq!(
            aggregator.compile(&mut table, &mut state, 2500),
            CompileOutcome::AlreadyComplete
        );
        assert_eq!(state.run_time(9000), 1500);
    }

    #[test]
    fn regression_is_reported() {
        let (mut table, mut state) = running(Accuracy::new(99, 99), &[]);
        let aggregator = Aggregator::new(SAMPLES);

        table.update_result(LOCAL_SLOT, 780, 1);
        aggregator.compile(&mut table, &mut state, 100);
        table.update_result(LOCAL_SLOT, 600, 2);
        let outcome = aggregator.compile(&mut table, &mut state, 200);
        assert!(matches!(
            outcome,
            CompileOutcome::NextRound {
                trend: Trend::Regressing,
                ..
            }
        ));
    }
}
