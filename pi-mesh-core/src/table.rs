//! Node Table
//!
//! The authoritative record of every board this node has heard from. One
//! [`Node`] per id, stored in discovery order in a fixed-capacity arena with an
//! id → slot lookup. Slot 0 is always the local node.
//!
//! ## Invariants
//!
//! - ids are unique and a slot's id never changes
//! - the table only grows; nothing is evicted until the process restarts
//! - discovering an id beyond capacity is [`TableError::TableFull`], which the
//!   caller must treat as fatal
//!
//! ## Dedup
//!
//! An observation is new when its remote time is later than the one stored,
//! or when the node has been silent for at least the idle threshold (it may
//! have rebooted and restarted its clock). Anything else is a duplicate and
//! must be neither applied nor forwarded.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;

use crate::traits::{Millis, NodeId};

/// Slot of the local node
pub const LOCAL_SLOT: usize = 0;

/// Ping-count penalty applied when the spam guard trips
pub const SPAM_PENALTY: u16 = 2;

/// One observed board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    last_remote_time: Millis,
    last_local_time: Millis,
    ping_count: u16,
    active: bool,
    sequence: u32,
    round: u32,
    result: u32,
}

impl Node {
    fn discovered(id: NodeId, remote_time: Millis, now: Millis) -> Self {
        Self {
            id,
            last_remote_time: remote_time,
            last_local_time: now,
            ping_count: 1,
            active: false,
            sequence: 0,
            round: 0,
            result: 0,
        }
    }

    /// Board id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Latest time the board itself stamped on a packet
    pub fn last_remote_time(&self) -> Millis {
        self.last_remote_time
    }

    /// Local clock at the last accepted packet from this board
    pub fn last_local_time(&self) -> Millis {
        self.last_local_time
    }

    /// Accepted packets, minus spam penalties
    pub fn ping_count(&self) -> u16 {
        self.ping_count
    }

    /// Liveness as of the last heartbeat
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 1-based ordinal among active nodes; 0 when unsequenced
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Round the stored result belongs to
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Latest partial count; 0 when none has arrived this round
    pub fn result(&self) -> u32 {
        self.result
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }

    pub(crate) fn forget_result(&mut self) {
        self.result = 0;
        self.ping_count = 0;
    }

    fn bump_ping(&mut self) {
        match self.ping_count.checked_add(1) {
            Some(count) => self.ping_count = count,
            None => tracing::warn!(node = %self.id, "ping count saturated"),
        }
    }
}

/// Fixed-capacity table of observed boards
#[derive(Debug, Clone)]
pub struct NodeTable {
    nodes: Vec<Node>,
    slots: BTreeMap<NodeId, usize>,
    capacity: usize,
    idle_threshold: Millis,
}

impl NodeTable {
    /// Create a table holding only the local node
    ///
    /// The local node starts active with sequence 1.
    pub fn new(local: NodeId, capacity: usize, idle_threshold: Millis, now: Millis) -> Self {
        assert!(capacity > 0, "node table needs room for the local node");

        let mut node = Node::discovered(local, 0, now);
        node.ping_count = 0;
        node.active = true;
        node.sequence = 1;

        let mut nodes = Vec::with_capacity(capacity);
        nodes.push(node);
        let mut slots = BTreeMap::new();
        slots.insert(local, LOCAL_SLOT);

        Self {
            nodes,
            slots,
            capacity,
            idle_threshold,
        }
    }

    /// Record a packet stamped `remote_time` by `id`, received at local `now`
    ///
    /// Returns the slot of the node on a new observation.
    pub fn record_observation(
        &mut self,
        id: NodeId,
        remote_time: Millis,
        now: Millis,
    ) -> Result<usize, TableError> {
        if let Some(&slot) = self.slots.get(&id) {
            let idle_threshold = self.idle_threshold;
            let node = &mut self.nodes[slot];
            assert!(
                now >= node.last_local_time,
                "local clock moved backwards: {} < {}",
                now,
                node.last_local_time
            );

            let later = remote_time > node.last_remote_time;
            let restarted = remote_time != node.last_remote_time
                && now - node.last_local_time >= idle_threshold;
            if !(later || restarted) {
                return Err(TableError::Duplicate {
                    node: id,
                    time: remote_time,
                });
            }

            node.bump_ping();
            node.last_remote_time = remote_time;
            node.last_local_time = now;
            return Ok(slot);
        }

        if self.nodes.len() >= self.capacity {
            return Err(TableError::TableFull {
                capacity: self.capacity,
            });
        }

        let slot = self.nodes.len();
        self.nodes.push(Node::discovered(id, remote_time, now));
        self.slots.insert(id, slot);
        Ok(slot)
    }

    /// Coarse rate check: more accepted pings than seconds on the sender's clock
    ///
    /// Trips when the node's ping count exceeds `remote_time / 1000`; the node
    /// is then penalized by [`SPAM_PENALTY`] pings and `true` is returned.
    pub(crate) fn throttle(&mut self, slot: usize, remote_time: Millis) -> bool {
        let node = &mut self.nodes[slot];
        if u32::from(node.ping_count) > remote_time / 1000 {
            node.ping_count = node.ping_count.saturating_sub(SPAM_PENALTY);
            true
        } else {
            false
        }
    }

    /// Stamp for the next self-originated packet, strictly after the last one
    pub(crate) fn next_emission_time(&self, now: Millis) -> Millis {
        let last = self.nodes[LOCAL_SLOT].last_remote_time;
        if now > last {
            now
        } else {
            last.saturating_add(1)
        }
    }

    /// Record a self-originated packet so its echo reads as a duplicate
    pub(crate) fn record_emission(&mut self, time: Millis, now: Millis, count_ping: bool) {
        let local = &mut self.nodes[LOCAL_SLOT];
        if count_ping {
            local.bump_ping();
        }
        local.last_remote_time = time;
        local.last_local_time = now;
    }

    /// Store a node's reported result for `round`
    ///
    /// A zero result is never a valid answer and never overwrites a real one.
    pub(crate) fn update_result(&mut self, slot: usize, result: u32, round: u32) {
        assert!(
            slot < self.nodes.len(),
            "result update for slot {} outside table of {}",
            slot,
            self.nodes.len()
        );
        if result == 0 {
            return;
        }
        let node = &mut self.nodes[slot];
        node.result = result;
        node.round = round;
    }

    /// Clear sequence, round and result of every row; ids and liveness survive
    pub(crate) fn clear_calculation(&mut self) {
        for node in &mut self.nodes {
            node.sequence = 0;
            node.round = 0;
            node.result = 0;
        }
    }

    /// Clear round and result of every row for the next round
    pub(crate) fn clear_round(&mut self) {
        for node in &mut self.nodes {
            node.round = 0;
            node.result = 0;
        }
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// The local node
    pub fn local(&self) -> &Node {
        &self.nodes[LOCAL_SLOT]
    }

    /// Id of the local node
    pub fn local_id(&self) -> NodeId {
        self.nodes[LOCAL_SLOT].id
    }

    /// Node in `slot`
    pub fn get(&self, slot: usize) -> Option<&Node> {
        self.nodes.get(slot)
    }

    /// Slot holding `id`
    pub fn slot_of(&self, id: NodeId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Node with `id`
    pub fn find(&self, id: NodeId) -> Option<&Node> {
        self.slot_of(id).map(|slot| &self.nodes[slot])
    }

    /// Rows in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Number of known nodes, local included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the local node is always present
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum number of nodes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Idle threshold used for dedup and liveness
    pub fn idle_threshold(&self) -> Millis {
        self.idle_threshold
    }

    /// Number of rows holding a sequence number
    pub fn sequenced_count(&self) -> u32 {
        self.nodes.iter().filter(|n| n.sequence > 0).count() as u32
    }
}

/// Observation outcomes that are not a new observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Same (id, time) as already recorded, or an older replay
    Duplicate {
        /// Reporting node
        node: NodeId,
        /// Replayed time
        time: Millis,
    },
    /// A new id arrived with no free slot left
    TableFull {
        /// Table capacity
        capacity: usize,
    },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Duplicate { node, time } => {
                write!(f, "duplicate observation: node={}, time={}", node, time)
            }
            TableError::TableFull { capacity } => {
                write!(f, "node table full: capacity={}", capacity)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TableError {}
