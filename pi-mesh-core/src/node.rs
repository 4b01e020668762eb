//! Mesh node context
//!
//! [`MeshNode`] owns the Node Table, the Round State and every component that
//! reads or writes them. It is driven from outside by three entry points that
//! each run to completion:
//!
//! - [`MeshNode::handle_frame`] for bytes arriving on a face
//! - [`MeshNode::heartbeat`] on the heartbeat timer
//! - [`MeshNode::sample`] / [`MeshNode::sample_batch`] from the main loop
//!
//! Each returns [`Effects`]: frames to send, events to report, and possibly a
//! restart request. The node never performs I/O itself.
//!
//! ## Result handling order
//!
//! ```text
//! self-echo → dedup/record → spam guard → stale → saturated
//!           → forward → round 0 stop → newer version reset → apply
//! ```

use alloc::vec::Vec;

use crate::aggregation::{Aggregator, CompileOutcome, Trend};
use crate::codec::{Accuracy, Distribute, Packet, ResultPacket};
use crate::config::{ConfigError, MeshConfig};
use crate::dissemination::{Dissemination, Outbound};
use crate::liveness::LivenessMonitor;
use crate::round::{reset_calculation, Phase, RoundState, Verdict};
use crate::sampler::{SampleStep, Sampler};
use crate::snapshot::{RowSnapshot, TableSnapshot};
use crate::table::{NodeTable, TableError, LOCAL_SLOT};
use crate::traits::{Face, Millis, NodeId, TrialSource};
use crate::{Rejection, Result};

/// Status light colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Node is about to restart
    Off,
    /// Accuracy regressed
    Red,
    /// Accuracy improved or target reached
    Green,
    /// New calculation admitted
    Blue,
}

/// Something worth reporting that happened inside the node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// A node became active
    Joined(NodeId),
    /// A node went silent
    Left(NodeId),
    /// A calculation was admitted (Distribute or newer version)
    CalculationStarted {
        /// Version of the admitted calculation
        version: u32,
        /// Accuracy it runs to
        target: Accuracy,
    },
    /// A round compiled without reaching the target
    RoundCompleted {
        /// Round that was compiled
        round: u32,
        /// Estimate after this round
        estimate: f64,
        /// Accuracy of that estimate, in percent
        accuracy: f32,
        /// Direction against the previous round
        trend: Trend,
    },
    /// Target accuracy reached
    CalculationComplete {
        /// Final estimate
        estimate: f64,
        /// Accuracy reached, in percent
        accuracy: f32,
        /// Time from admission to completion
        elapsed: Millis,
    },
    /// Status light change
    Status(Indicator),
    /// A face asked for the table; arm the table timer
    TerminalBound(Face),
    /// Newer-version Result whose round was too far from ours
    HotSwapIgnored {
        /// Sender of the ignored Result
        node: NodeId,
        /// Round it carried
        round: u32,
    },
}

/// Conditions that end the node's life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// A new id arrived with the table full
    TableExhausted {
        capacity: usize,
    },
    /// An `x` packet was received
    RebootRequested,
}

impl core::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RestartReason::TableExhausted { capacity } => {
                write!(f, "node table exhausted (capacity {})", capacity)
            }
            RestartReason::RebootRequested => write!(f, "reboot requested"),
        }
    }
}

/// What the caller must do after an operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects {
    /// Frames to send, in order
    pub outbound: Vec<Outbound>,
    /// Events to report, in order
    pub events: Vec<NodeEvent>,
    /// Set when the node must be torn down and recreated
    pub restart: Option<RestartReason>,
}

impl Effects {
    /// True when nothing needs to be done
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty() && self.restart.is_none()
    }

    /// Append `other` after `self`
    pub fn extend(&mut self, other: Effects) {
        self.outbound.extend(other.outbound);
        self.events.extend(other.events);
        if self.restart.is_none() {
            self.restart = other.restart;
        }
    }

    fn restarting(reason: RestartReason) -> Self {
        Self {
            events: alloc::vec![NodeEvent::Status(Indicator::Off)],
            restart: Some(reason),
            ..Self::default()
        }
    }
}

/// A single mesh node
#[derive(Debug, Clone)]
pub struct MeshNode {
    config: MeshConfig,
    table: NodeTable,
    state: RoundState,
    liveness: LivenessMonitor,
    policy: Dissemination,
    sampler: Sampler,
    aggregator: Aggregator,
}

impl MeshNode {
    /// Boot a node with id `local` at local clock `now`
    pub fn new(
        local: NodeId,
        config: MeshConfig,
        now: Millis,
    ) -> core::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            table: NodeTable::new(local, config.capacity, config.idle_threshold_ms, now),
            state: RoundState::new(now),
            liveness: LivenessMonitor::new(local),
            policy: Dissemination::new(config.face_count),
            sampler: Sampler::new(config.samples_per_cycle),
            aggregator: Aggregator::new(config.samples_per_cycle),
            config,
        })
    }

    /// Id of this node
    pub fn local_id(&self) -> NodeId {
        self.table.local_id()
    }

    /// Configuration the node was booted with
    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// The Node Table
    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    /// Calculation state
    pub fn state(&self) -> &RoundState {
        &self.state
    }

    /// Active set as of the last heartbeat
    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Forwarding policy, including the bound terminal face
    pub fn dissemination(&self) -> &Dissemination {
        &self.policy
    }

    /// True while the sampler has trials to run
    ///
    /// A completed node keeps sampling so peers still running get fresh
    /// results; only an idle node has nothing to sample for.
    pub fn is_sampling(&self) -> bool {
        self.state.phase() != Phase::Idle && self.sampler.is_armed()
    }

    /// Decode and handle one frame that arrived on `face`
    pub fn handle_frame(&mut self, face: Face, frame: &[u8], now: Millis) -> Result<Effects> {
        assert!(
            face.index() < usize::from(self.config.face_count),
            "frame from {} on a node with {} faces",
            face,
            self.config.face_count
        );

        let packet = Packet::decode(frame).map_err(|err| {
            tracing::warn!(%face, error = %err, "dropping malformed frame");
            Rejection::from(err)
        })?;
        self.handle_packet(packet, Some(face), now)
    }

    /// Handle a decoded packet; `arrival` is `None` for local injection
    pub fn handle_packet(
        &mut self,
        packet: Packet,
        arrival: Option<Face>,
        now: Millis,
    ) -> Result<Effects> {
        let outcome = match packet {
            Packet::Distribute(distribute) => self.on_distribute(distribute, arrival, now),
            Packet::Result(result) => self.on_result(result, arrival, now),
            Packet::Table => Ok(self.on_table(arrival)),
            Packet::Reboot => Ok(self.on_reboot()),
        };
        if let Err(rejection) = &outcome {
            log_rejection(rejection);
        }
        outcome
    }

    /// Heartbeat: self-emission, liveness pass, compile, re-arm the sampler
    pub fn heartbeat(&mut self, now: Millis) -> Effects {
        let mut effects = Effects::default();

        if self.table.throttle(LOCAL_SLOT, now) {
            tracing::warn!(
                pings = self.table.local().ping_count(),
                "self-emission throttled"
            );
        } else {
            effects.outbound = self.emit_result(None, now, true);
        }

        let report = self.liveness.refresh(&mut self.table, now);
        effects.events.extend(report.joined.into_iter().map(NodeEvent::Joined));
        effects.events.extend(report.left.into_iter().map(NodeEvent::Left));

        match self.aggregator.compile(&mut self.table, &mut self.state, now) {
            CompileOutcome::NextRound {
                round,
                estimate,
                accuracy,
                trend,
            } => {
                effects.events.push(NodeEvent::RoundCompleted {
                    round,
                    estimate,
                    accuracy,
                    trend,
                });
                effects.events.push(NodeEvent::Status(match trend {
                    Trend::Improving => Indicator::Green,
                    Trend::Regressing => Indicator::Red,
                }));
            }
            CompileOutcome::Complete {
                estimate,
                accuracy,
                elapsed,
            } => {
                effects.events.push(NodeEvent::CalculationComplete {
                    estimate,
                    accuracy,
                    elapsed,
                });
                effects.events.push(NodeEvent::Status(Indicator::Green));
            }
            _ => {}
        }

        self.sampler.rearm();
        effects
    }

    /// Run one trial; returns effects when it filled the quota
    pub fn sample<S: TrialSource + ?Sized>(
        &mut self,
        source: &mut S,
        now: Millis,
    ) -> Option<Effects> {
        if self.state.phase() == Phase::Idle {
            return None;
        }
        match self.sampler.step(&mut self.state.cycle, source) {
            SampleStep::QuotaReached { inside } => {
                self.table.update_result(LOCAL_SLOT, inside, self.state.round());
                Some(Effects {
                    outbound: self.emit_result(None, now, false),
                    ..Effects::default()
                })
            }
            SampleStep::Trial { .. } | SampleStep::Suspended => None,
        }
    }

    /// Run up to `budget` trials, stopping early at the quota
    pub fn sample_batch<S: TrialSource + ?Sized>(
        &mut self,
        source: &mut S,
        now: Millis,
        budget: u32,
    ) -> Effects {
        for _ in 0..budget {
            if !self.is_sampling() {
                break;
            }
            if let Some(effects) = self.sample(source, now) {
                return effects;
            }
        }
        Effects::default()
    }

    /// Copy out everything the table renderer shows
    pub fn snapshot(&self, now: Millis) -> TableSnapshot {
        let local_round = self.table.local().round();
        TableSnapshot {
            taken_at: now,
            local: self.local_id(),
            target: self.state.target(),
            version: self.state.version(),
            round: self.state.round(),
            phase: self.state.phase(),
            estimate: self.state.estimate(),
            current_accuracy: self.state.current_accuracy(),
            run_time: self.state.run_time(now),
            points_generated: u64::from(self.state.sequenced())
                * u64::from(local_round)
                * u64::from(self.sampler.quota()),
            rows: self
                .table
                .iter()
                .map(|node| RowSnapshot {
                    id: node.id(),
                    active: node.is_active(),
                    last_local_time: node.last_local_time(),
                    sequence: node.sequence(),
                    ping_count: node.ping_count(),
                    round: node.round(),
                    result: node.result(),
                })
                .collect(),
        }
    }

    fn on_distribute(
        &mut self,
        distribute: Distribute,
        arrival: Option<Face>,
        now: Millis,
    ) -> Result<Effects> {
        let version = self
            .state
            .admit_distribute(&distribute, self.config.accuracy_threshold)?;

        let mut effects = self.admit(distribute.accuracy, version, now);
        effects.outbound = self.emit_result(arrival, now, false);
        Ok(effects)
    }

    fn on_result(
        &mut self,
        packet: ResultPacket,
        arrival: Option<Face>,
        now: Millis,
    ) -> Result<Effects> {
        if packet.node == self.local_id() {
            return Err(Rejection::SelfEcho);
        }

        let slot = match self.table.record_observation(packet.node, packet.time, now) {
            Ok(slot) => slot,
            Err(TableError::Duplicate { node, time }) => {
                return Err(Rejection::Duplicate { node, time });
            }
            Err(TableError::TableFull { capacity }) => {
                tracing::error!(
                    node = %packet.node,
                    capacity,
                    "node table exhausted, restarting"
                );
                return Ok(Effects::restarting(RestartReason::TableExhausted { capacity }));
            }
        };

        if self.table.throttle(slot, packet.time) {
            return Err(Rejection::Spam { node: packet.node });
        }

        let verdict = self.state.classify(&packet)?;

        let mut effects = Effects {
            outbound: self.policy.flood(&Packet::Result(packet), arrival),
            ..Effects::default()
        };

        if packet.round == 0 {
            return Ok(effects);
        }

        if verdict == Verdict::Newer {
            let admitted = self.admit(packet.accuracy, packet.version, now);
            effects.events.extend(admitted.events);

            if self.state.is_hot_swap(packet.round) {
                tracing::warn!(
                    node = %packet.node,
                    round = packet.round,
                    local_round = self.state.round(),
                    "hot-swap inconsistency, result ignored"
                );
                effects.events.push(NodeEvent::HotSwapIgnored {
                    node: packet.node,
                    round: packet.round,
                });
                return Ok(effects);
            }
        }

        self.table.update_result(slot, packet.value, packet.round);
        Ok(effects)
    }

    fn on_table(&mut self, arrival: Option<Face>) -> Effects {
        let Some(face) = arrival else {
            tracing::debug!("table request without a face, ignored");
            return Effects::default();
        };
        self.policy.bind_terminal(face);
        tracing::info!(%face, "terminal bound");
        Effects {
            events: alloc::vec![NodeEvent::TerminalBound(face)],
            ..Effects::default()
        }
    }

    fn on_reboot(&mut self) -> Effects {
        tracing::error!(node = %self.local_id(), "reboot requested");
        Effects {
            outbound: self.policy.broadcast(&Packet::Reboot),
            ..Effects::restarting(RestartReason::RebootRequested)
        }
    }

    fn admit(&mut self, target: Accuracy, version: u32, now: Millis) -> Effects {
        reset_calculation(
            &mut self.state,
            &mut self.table,
            self.liveness.active_set(),
            target,
            version,
            now,
        );
        Effects {
            events: alloc::vec![
                NodeEvent::CalculationStarted { version, target },
                NodeEvent::Status(Indicator::Blue),
            ],
            ..Effects::default()
        }
    }

    /// Mint and flood a self-originated Result
    fn emit_result(
        &mut self,
        arrival: Option<Face>,
        now: Millis,
        count_ping: bool,
    ) -> Vec<Outbound> {
        let time = self.table.next_emission_time(now);
        self.table.record_emission(time, now, count_ping);

        let local = self.table.local();
        let packet = ResultPacket {
            node: local.id(),
            time,
            version: self.state.version(),
            round: self.state.round(),
            accuracy: self.state.target(),
            value: local.result(),
        };
        self.policy.flood(&Packet::Result(packet), arrival)
    }
}

fn log_rejection(rejection: &Rejection) {
    match rejection {
        Rejection::Malformed(_) => {}
        r if r.is_noise() => tracing::debug!(reason = %r, "packet dropped"),
        r => tracing::warn!(reason = %r, "packet rejected"),
    }
}
