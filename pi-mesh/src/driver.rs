//! Node driver
//!
//! [`NodeDriver`] owns one [`MeshNode`] and everything it needs from the
//! outside world: a transport for its faces, a runtime for its clock, and a
//! trial source for the sampler. The event loop multiplexes four wake-ups:
//!
//! - an inbound frame on any face
//! - the heartbeat timer
//! - the table timer, once a terminal face is bound
//! - the sampler, whenever the node wants trials
//!
//! Sampling runs in bounded batches and yields between them, so frames and
//! timers are never starved by the Monte-Carlo loop.

use std::time::Duration;

use pi_mesh_core::config::MeshConfig;
use pi_mesh_core::node::{Effects, Indicator, MeshNode, NodeEvent, RestartReason};
use pi_mesh_core::snapshot::TableSnapshot;
use pi_mesh_core::traits::{Face, NodeId, TrialSource};
use pi_mesh_net::traits::MeshTransport;
use pi_mesh_runtime::MeshRuntime;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::render::render_table;
use crate::Result;

/// Trials run per sampler wake-up
pub const SAMPLE_BATCH: u32 = 64;

enum Wake {
    Frame(Face, Vec<u8>),
    Heartbeat,
    Table,
    Sample,
}

/// Runs one mesh node against a transport
pub struct NodeDriver<T, R, S> {
    config: MeshConfig,
    transport: T,
    runtime: R,
    source: S,
    node: MeshNode,
    snapshots: watch::Sender<TableSnapshot>,
}

impl<T, R, S> NodeDriver<T, R, S>
where
    T: MeshTransport,
    R: MeshRuntime,
    S: TrialSource + Send,
{
    /// Create a driver; the node boots at the runtime's current time
    pub fn new(
        local: NodeId,
        config: MeshConfig,
        transport: T,
        runtime: R,
        source: S,
    ) -> Result<Self> {
        let node = MeshNode::new(local, config.clone(), runtime.millis())?;
        let (snapshots, _) = watch::channel(node.snapshot(runtime.millis()));

        Ok(Self {
            config,
            transport,
            runtime,
            source,
            node,
            snapshots,
        })
    }

    /// The node being driven
    pub fn node(&self) -> &MeshNode {
        &self.node
    }

    /// Face the table is rendered to, if one asked for it
    pub fn terminal(&self) -> Option<Face> {
        self.node.dissemination().terminal()
    }

    /// Receive a fresh snapshot after every heartbeat and restart
    pub fn subscribe(&self) -> watch::Receiver<TableSnapshot> {
        self.snapshots.subscribe()
    }

    /// Run forever, restarting the node whenever it asks to
    ///
    /// Returns only when the transport fails.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let reason = self.run_until_restart().await?;
            self.restart(reason).await?;
        }
    }

    /// Drive the current node until it requests a restart
    pub async fn run_until_restart(&mut self) -> Result<RestartReason> {
        let mut heartbeat = periodic(self.config.heartbeat_period_ms);
        let mut table = periodic(self.config.table_period_ms);

        loop {
            let sampling = self.node.is_sampling();
            let rendering = self.terminal().is_some();

            let wake = tokio::select! {
                inbound = self.transport.recv() => {
                    let (face, frame) = inbound?;
                    Wake::Frame(face, frame)
                }
                _ = heartbeat.tick() => Wake::Heartbeat,
                _ = table.tick(), if rendering => Wake::Table,
                _ = tokio::task::yield_now(), if sampling => Wake::Sample,
            };

            let now = self.runtime.millis();
            let effects = match wake {
                Wake::Frame(face, frame) => match self.node.handle_frame(face, &frame, now) {
                    Ok(effects) => effects,
                    // The node has already logged the rejection.
                    Err(_) => continue,
                },
                Wake::Heartbeat => {
                    let effects = self.node.heartbeat(now);
                    self.publish(now);
                    effects
                }
                Wake::Table => {
                    self.render(now).await;
                    continue;
                }
                Wake::Sample => self.node.sample_batch(&mut self.source, now, SAMPLE_BATCH),
            };

            if let Some(reason) = self.apply(effects, &mut table).await {
                return Ok(reason);
            }
        }
    }

    /// Tear the node down and boot a fresh one with the same id
    ///
    /// Waits out the reboot grace period so the reboot broadcast leaves every
    /// face, then discards whatever arrived meanwhile.
    pub async fn restart(&mut self, reason: RestartReason) -> Result<()> {
        let local = self.node.local_id();
        tracing::warn!(node = %local, %reason, "restarting node");

        self.runtime
            .sleep(Duration::from_millis(u64::from(self.config.reboot_grace_ms)))
            .await;
        let dropped = self.transport.drain().await;

        let now = self.runtime.millis();
        self.node = MeshNode::new(local, self.config.clone(), now)?;
        self.publish(now);

        tracing::info!(node = %local, dropped, "node restarted");
        Ok(())
    }

    async fn apply(&mut self, effects: Effects, table: &mut Interval) -> Option<RestartReason> {
        for outbound in &effects.outbound {
            if let Err(err) = self.transport.send(outbound.face, &outbound.frame).await {
                tracing::warn!(face = %outbound.face, error = %err, "send failed");
            }
        }

        let local = self.node.local_id();
        for event in &effects.events {
            match event {
                NodeEvent::Joined(id) => tracing::info!(node = %local, peer = %id, "node joined"),
                NodeEvent::Left(id) => tracing::info!(node = %local, peer = %id, "node left"),
                NodeEvent::CalculationStarted { version, target } => {
                    tracing::info!(node = %local, version, target = %target, "calculation started")
                }
                NodeEvent::RoundCompleted {
                    round,
                    estimate,
                    accuracy,
                    trend,
                } => tracing::info!(
                    node = %local,
                    round,
                    estimate,
                    accuracy,
                    ?trend,
                    "round compiled"
                ),
                NodeEvent::CalculationComplete {
                    estimate,
                    accuracy,
                    elapsed,
                } => tracing::info!(
                    node = %local,
                    estimate,
                    accuracy,
                    elapsed_ms = elapsed,
                    "calculation complete"
                ),
                NodeEvent::Status(indicator) => indicate(local, *indicator),
                NodeEvent::TerminalBound(face) => {
                    tracing::info!(node = %local, %face, "terminal bound");
                    table.reset_immediately();
                }
                NodeEvent::HotSwapIgnored { node, round } => {
                    tracing::debug!(node = %local, peer = %node, round, "hot-swap result ignored")
                }
            }
        }

        effects.restart
    }

    async fn render(&mut self, now: u32) {
        let Some(face) = self.terminal() else {
            return;
        };
        let text = render_table(&self.node.snapshot(now), self.config.precision);
        if let Err(err) = self.transport.send(face, text.as_bytes()).await {
            tracing::warn!(%face, error = %err, "table render failed");
        }
    }

    fn publish(&self, now: u32) {
        self.snapshots.send_replace(self.node.snapshot(now));
    }
}

impl<T, R, S> std::fmt::Debug for NodeDriver<T, R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDriver")
            .field("node", &self.node.local_id())
            .field("version", &self.node.state().version())
            .field("terminal", &self.node.dissemination().terminal())
            .finish_non_exhaustive()
    }
}

/// Interval whose first tick fires one period from now
fn periodic(period_ms: u32) -> Interval {
    let period = Duration::from_millis(u64::from(period_ms));
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn indicate(node: NodeId, indicator: Indicator) {
    match indicator {
        Indicator::Red => tracing::debug!(%node, "status light red"),
        Indicator::Green => tracing::debug!(%node, "status light green"),
        Indicator::Blue => tracing::debug!(%node, "status light blue"),
        Indicator::Off => tracing::trace!(%node, "status light off"),
    }
}
