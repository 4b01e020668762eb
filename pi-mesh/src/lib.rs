//! # pi-mesh
//!
//! **Leaderless Monte-Carlo estimation of pi over a mesh of identical nodes.**
//!
//! Every node throws darts at a quarter circle, floods its per-round hit count
//! to its neighbours, and compiles the rounds of every active node into a
//! shared estimate. There is no coordinator: a version counter carried in
//! every Result packet decides which calculation is current, and every node
//! sequences the active set on its own.
//!
//! The protocol logic lives in [`pi_mesh_core`] and is free of I/O. This
//! crate wires it to a transport and a clock:
//!
//! - [`driver::NodeDriver`] runs one node: frames in, timers, sampling, frames out
//! - [`render::render_table`] draws the terminal table from a snapshot
//! - [`MeshConfigBuilder`] builds and validates a [`MeshConfig`], optionally
//!   from a JSON file
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pi_mesh::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! #[tokio::main]
//! async fn main() -> pi_mesh::Result<()> {
//!     let config = MeshConfigBuilder::new().face_count(2).build()?;
//!     let mut mesh = MockMesh::new(2, config.face_count);
//!     mesh.connect(0, Face(0), 1, Face(1));
//!
//!     let source = QuarterCircle::new(StdRng::seed_from_u64(1), config.radius);
//!     let driver = NodeDriver::new(
//!         NodeId(0x0a01),
//!         config,
//!         mesh.endpoint(0),
//!         TokioRuntime::new(),
//!         source,
//!     )?;
//!     driver.run().await
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Standard library support
//! - `tokio-runtime` (default): Use Tokio for timers and the clock
//!
//! ## Crate Structure
//!
//! - [`pi_mesh_core`]: Node table, codec, round state machine (no_std compatible)
//! - [`pi_mesh_net`]: Face transport, line framing and the mock mesh
//! - [`pi_mesh_runtime`]: Clock and task glue

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(not(feature = "std"))]
compile_error!("`pi-mesh` requires the `std` feature. Use `pi-mesh-core` for no_std targets.");

// Re-export sub-crates
pub use pi_mesh_core as core;
pub use pi_mesh_net as net;
pub use pi_mesh_runtime as runtime;

// Re-export commonly used items at the top level
pub use pi_mesh_core::{
    config::{ConfigError, MeshConfig},
    node::{Effects, Indicator, MeshNode, NodeEvent, RestartReason},
    snapshot::TableSnapshot,
    traits::{Face, Millis, NodeId, QuarterCircle, TrialSource},
    Rejection,
};

pub use pi_mesh_net::{traits::MeshTransport, Injector, MockEndpoint, MockMesh};
pub use pi_mesh_runtime::MeshRuntime;

/// Needed to implement [`MeshTransport`] outside this workspace
pub use async_trait::async_trait;

pub mod driver;
pub mod render;

pub use driver::NodeDriver;

/// Prelude module for convenient imports
///
/// ```rust,ignore
/// use pi_mesh::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::net::prelude::*;

    #[cfg(feature = "tokio-runtime")]
    pub use crate::runtime::tokio_runtime::TokioRuntime;
    pub use crate::runtime::MeshRuntime;

    pub use crate::driver::NodeDriver;
    pub use crate::render::render_table;
    pub use crate::{MeshConfigBuilder, MockMesh};
}

/// Errors surfaced by the node driver and config loading
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] pi_mesh_net::Error),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the driver layer
pub type Result<T> = std::result::Result<T, Error>;

/// Builder for [`MeshConfig`]
///
/// Starts from the board defaults. [`build`](Self::build) validates, so a
/// config that leaves the builder is always runnable.
#[derive(Debug, Default)]
pub struct MeshConfigBuilder {
    config: MeshConfig,
}

impl MeshConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config: MeshConfig = serde_json::from_slice(&bytes)?;
        Ok(Self { config })
    }

    /// Set the Node Table capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the number of faces
    pub fn face_count(mut self, faces: u8) -> Self {
        self.config.face_count = faces;
        self
    }

    /// Set how long a node may stay silent before it counts as inactive
    pub fn idle_threshold_ms(mut self, ms: Millis) -> Self {
        self.config.idle_threshold_ms = ms;
        self
    }

    /// Set the heartbeat period
    pub fn heartbeat_period_ms(mut self, ms: Millis) -> Self {
        self.config.heartbeat_period_ms = ms;
        self
    }

    /// Set the table render period
    pub fn table_period_ms(mut self, ms: Millis) -> Self {
        self.config.table_period_ms = ms;
        self
    }

    /// Set the number of trials per heartbeat cycle
    pub fn samples_per_cycle(mut self, samples: u32) -> Self {
        self.config.samples_per_cycle = samples;
        self
    }

    /// Set the quarter-circle radius
    pub fn radius(mut self, radius: u32) -> Self {
        self.config.radius = radius;
        self
    }

    /// Set the highest target accuracy a Distribute may request
    pub fn accuracy_threshold(mut self, percent: f32) -> Self {
        self.config.accuracy_threshold = percent;
        self
    }

    /// Set the number of decimals shown for estimates
    pub fn precision(mut self, digits: u32) -> Self {
        self.config.precision = digits;
        self
    }

    /// Set the delay between a reboot broadcast and the restart
    pub fn reboot_grace_ms(mut self, ms: Millis) -> Self {
        self.config.reboot_grace_ms = ms;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> Result<MeshConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
