//! Transport traits
//!
//! A node talks to the world only through numbered faces. The transport
//! hides what a face is (a serial port, a socket, a channel in a test).

use alloc::vec::Vec;

use pi_mesh_core::traits::Face;

use crate::Result;

/// Core transport trait for a mesh node
#[async_trait::async_trait]
pub trait MeshTransport: Send + Sync {
    /// Write one frame to `face`
    ///
    /// The frame is written as is; callers include the terminator.
    async fn send(&self, face: Face, frame: &[u8]) -> Result<()>;

    /// Next complete frame from any face, terminator stripped
    async fn recv(&self) -> Result<(Face, Vec<u8>)>;

    /// Discard everything received but not yet consumed
    ///
    /// Returns the number of frames dropped.
    async fn drain(&self) -> usize;

    /// Number of faces
    fn face_count(&self) -> u8;
}
