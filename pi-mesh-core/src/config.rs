//! Node configuration
//!
//! Every tunable constant of a mesh node lives here. Defaults match the
//! deployed boards: 32 table slots, four faces, a one second heartbeat.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::traits::Millis;

/// Configuration for a single mesh node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Node Table capacity, local slot included
    pub capacity: usize,
    /// Number of physical faces
    pub face_count: u8,
    /// Silence after which a node is considered inactive
    pub idle_threshold_ms: Millis,
    /// Heartbeat timer period
    pub heartbeat_period_ms: Millis,
    /// Table-render timer period
    pub table_period_ms: Millis,
    /// Trials the Sampler runs per heartbeat cycle
    pub samples_per_cycle: u32,
    /// Radius of the sampled quarter circle
    pub radius: u32,
    /// Highest target accuracy (percent) a Distribute may ask for
    pub accuracy_threshold: f32,
    /// Decimal digits shown for estimates; even and at most 10
    pub precision: u32,
    /// Delay between broadcasting a reboot and restarting
    pub reboot_grace_ms: Millis,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            capacity: 32,
            face_count: 4,
            idle_threshold_ms: 5000,
            heartbeat_period_ms: 1000,
            table_period_ms: 500,
            samples_per_cycle: 1000,
            radius: 1000,
            accuracy_threshold: 100.0,
            precision: 10,
            reboot_grace_ms: 500,
        }
    }
}

impl MeshConfig {
    /// Check the configuration for values the node cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.face_count == 0 {
            return Err(ConfigError::NoFaces);
        }
        if self.samples_per_cycle == 0 {
            return Err(ConfigError::ZeroQuota);
        }
        if self.radius == 0 {
            return Err(ConfigError::ZeroRadius);
        }
        if self.heartbeat_period_ms == 0 || self.table_period_ms == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.precision % 2 != 0 || self.precision > 10 {
            return Err(ConfigError::InvalidPrecision(self.precision));
        }
        if !self.accuracy_threshold.is_finite() || self.accuracy_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// Node Table needs at least the local slot
    ZeroCapacity,
    /// At least one face is required
    NoFaces,
    /// Sampler quota must be non-zero
    ZeroQuota,
    /// Sampling radius must be non-zero
    ZeroRadius,
    /// Timer periods must be non-zero
    ZeroPeriod,
    /// Precision must be even and at most 10
    InvalidPrecision(u32),
    /// Accuracy threshold must be finite and non-negative
    InvalidThreshold,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroCapacity => write!(f, "capacity must be non-zero"),
            ConfigError::NoFaces => write!(f, "face count must be non-zero"),
            ConfigError::ZeroQuota => write!(f, "samples per cycle must be non-zero"),
            ConfigError::ZeroRadius => write!(f, "radius must be non-zero"),
            ConfigError::ZeroPeriod => write!(f, "timer periods must be non-zero"),
            ConfigError::InvalidPrecision(p) => {
                write!(f, "precision {} must be even and at most 10", p)
            }
            ConfigError::InvalidThreshold => {
                write!(f, "accuracy threshold must be finite and non-negative")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}
