//! Core types and seams for pi-mesh
//!
//! Identifiers shared by every component, plus the trait the Sampler draws
//! its trial outcomes from.

use core::fmt;

use rand_core::RngCore;
use serde::{Deserialize, Serialize};

/// Milliseconds on a node-local clock.
///
/// Every board counts from its own boot; values from different nodes are
/// never compared with each other.
pub type Millis = u32;

/// Board identifier
///
/// Opaque and stable for the lifetime of the board. Travels as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new NodeId
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// One of the fixed ports a node talks to its direct neighbours through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Face(pub u8);

impl Face {
    /// Create a new Face
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Index of the face, `0..face_count`
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "face{}", self.0)
    }
}

/// A source of random boolean trial outcomes
pub trait TrialSource {
    /// Run one trial; `true` counts as a hit
    fn next_trial(&mut self) -> bool;
}

/// Quarter-circle dart thrower
///
/// Draws two coordinates uniformly in `[0, radius]` and scores a hit when the
/// point lies within `radius` of the origin.
#[derive(Debug, Clone)]
pub struct QuarterCircle<R> {
    rng: R,
    radius: u32,
}

impl<R: RngCore> QuarterCircle<R> {
    /// Create a new dart thrower over the given random source
    pub fn new(rng: R, radius: u32) -> Self {
        Self { rng, radius }
    }

    fn coordinate(&mut self) -> u64 {
        // Span is at most 2^32, so the widening keeps the modulo exact.
        let span = u64::from(self.radius) + 1;
        self.rng.next_u64() % span
    }
}

impl<R: RngCore> TrialSource for QuarterCircle<R> {
    fn next_trial(&mut self) -> bool {
        let x = self.coordinate();
        let y = self.coordinate();
        let r = u64::from(self.radius);
        // x, y <= 2^32 - 1 so the squares fit in u128 without overflow.
        (x as u128 * x as u128) + (y as u128 * y as u128) <= r as u128 * r as u128
    }
}
