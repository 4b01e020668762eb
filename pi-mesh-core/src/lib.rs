//! # pi-mesh Core
//!
//! Protocol core of a leaderless Monte-Carlo mesh: every board samples
//! points, floods its partial counts to its neighbours, and all boards agree
//! on one running estimate without a coordinator.
//!
//! This crate is `no_std` compatible (it needs `alloc`) and provides:
//! - The Node Table and its heartbeat-driven Liveness Monitor
//! - The textual wire codec and the flood Dissemination Policy
//! - The Round State Machine, Sequencer and Aggregator
//! - The quota-bounded Sampler
//! - [`node::MeshNode`], the context object that owns all of the above
//!
//! Nothing here does I/O or reads a clock. Callers hand in bytes and
//! millisecond readings and get back [`node::Effects`] to apply.
//!
//! ## Feature Flags
//!
//! - `std` (default): Enable standard library support

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod aggregation;
pub mod codec;
pub mod config;
pub mod dissemination;
pub mod liveness;
pub mod node;
pub mod round;
pub mod sampler;
pub mod sequencer;
pub mod snapshot;
pub mod table;
pub mod traits;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::{Accuracy, Distribute, Packet, ResultPacket};
    pub use crate::config::MeshConfig;
    pub use crate::node::{Effects, Indicator, MeshNode, NodeEvent, RestartReason};
    pub use crate::traits::*;
    pub use crate::Rejection;
}

use codec::{Accuracy, CodecError};
use traits::{Millis, NodeId};

/// Result type for packet handling
pub type Result<T> = core::result::Result<T, Rejection>;

/// Every recoverable reason an inbound packet is dropped
///
/// None of these mutate shared state beyond what is documented on the
/// variant, and none are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Frame failed to decode
    Malformed(CodecError),
    /// (id, time) already seen
    Duplicate {
        /// Reporting node
        node: NodeId,
        /// Replayed time
        time: Millis,
    },
    /// A Result carrying our own id came back around a loop
    SelfEcho,
    /// Ping-count heuristic tripped; the node was penalized
    Spam {
        /// Offending node
        node: NodeId,
    },
    /// Result for an older calculation version
    Stale {
        /// Version carried by the packet
        version: u32,
        /// Local version
        current: u32,
    },
    /// Result carrying the saturated version value
    VersionSaturated {
        /// Reporting node
        node: NodeId,
    },
    /// Distribute target outside `[0, threshold]`
    AccuracyOutOfRange {
        /// Requested target
        requested: Accuracy,
    },
    /// Local version counter cannot be bumped again
    VersionExhausted,
}

impl Rejection {
    /// True for drops that are expected steady-state traffic
    pub fn is_noise(&self) -> bool {
        matches!(
            self,
            Rejection::Duplicate { .. } | Rejection::SelfEcho | Rejection::Stale { .. }
        )
    }
}

impl From<CodecError> for Rejection {
    fn from(err: CodecError) -> Self {
        Rejection::Malformed(err)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Rejection {}

impl core::fmt::Display for Rejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Rejection::Malformed(err) => write!(f, "malformed packet: {}", err),
            Rejection::Duplicate { node, time } => {
                write!(f, "duplicate packet: node={}, time={}", node, time)
            }
            Rejection::SelfEcho => write!(f, "own packet echoed back"),
            Rejection::Spam { node } => write!(f, "spam suspected from node {}", node),
            Rejection::Stale { version, current } => {
                write!(f, "stale version {} (current {})", version, current)
            }
            Rejection::VersionSaturated { node } => {
                write!(f, "saturated version from node {}", node)
            }
            Rejection::AccuracyOutOfRange { requested } => {
                write!(f, "target accuracy {} out of range", requested)
            }
            Rejection::VersionExhausted => write!(f, "version counter exhausted"),
        }
    }
}
