//! # pi-mesh Network
//!
//! Face transport abstractions for pi-mesh.
//!
//! This crate provides:
//! - Unified `MeshTransport` trait over a node's fixed set of faces
//! - Newline framing of the byte stream each face carries
//! - An in-memory mock mesh for tests and simulation

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod framing;

#[cfg(feature = "std")]
pub mod traits;

#[cfg(feature = "std")]
mod mock;
#[cfg(feature = "std")]
pub use mock::{Injector, MockEndpoint, MockMesh};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::framing::*;
    #[cfg(feature = "std")]
    pub use crate::traits::*;
}

use pi_mesh_core::traits::Face;

/// Result type for network operations
pub type Result<T> = core::result::Result<T, Error>;

/// Network error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Every sender of the inbound side is gone
    Closed,
    /// Peer on the other end of a face hung up
    SendFailed(Face),
    /// Face index beyond the node's face count
    FaceOutOfRange {
        /// Requested face
        face: Face,
        /// Faces the transport has
        face_count: u8,
    },
    /// A line exceeded the framer's limit and was discarded
    FrameTooLong {
        /// Bytes seen before giving up
        len: usize,
        /// Configured limit
        max: usize,
    },
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Closed => write!(f, "transport closed"),
            Error::SendFailed(face) => write!(f, "send failed on {}", face),
            Error::FaceOutOfRange { face, face_count } => {
                write!(f, "{} out of range for {} faces", face, face_count)
            }
            Error::FrameTooLong { len, max } => {
                write!(f, "frame of {} bytes exceeds limit of {}", len, max)
            }
        }
    }
}
