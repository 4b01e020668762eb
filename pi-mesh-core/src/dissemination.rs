//! Dissemination Policy
//!
//! Flood with one-hop back-edge suppression: a packet goes out on every face
//! except the one it arrived on and the terminal face, if one is bound.
//! Loops longer than two hops are broken by Node Table dedup, not here.

use alloc::vec::Vec;

use crate::codec::Packet;
use crate::traits::Face;

/// One encoded frame bound for one face
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Destination face
    pub face: Face,
    /// Newline-terminated frame
    pub frame: Vec<u8>,
}

/// Face selection for outbound packets
#[derive(Debug, Clone)]
pub struct Dissemination {
    face_count: u8,
    terminal: Option<Face>,
}

impl Dissemination {
    /// Create a policy over `face_count` faces with no terminal bound
    pub fn new(face_count: u8) -> Self {
        Self {
            face_count,
            terminal: None,
        }
    }

    /// Designate `face` as the human-facing terminal
    pub fn bind_terminal(&mut self, face: Face) {
        self.terminal = Some(face);
    }

    /// Currently bound terminal face
    pub fn terminal(&self) -> Option<Face> {
        self.terminal
    }

    /// Every face of the node
    pub fn all_faces(&self) -> impl Iterator<Item = Face> {
        (0..self.face_count).map(Face)
    }

    /// Faces a packet arriving on `arrival` is forwarded to
    ///
    /// Self-originated packets pass `None`.
    pub fn targets(&self, arrival: Option<Face>) -> Vec<Face> {
        self.all_faces()
            .filter(|face| Some(*face) != arrival && Some(*face) != self.terminal)
            .collect()
    }

    /// Encode `packet` once and address it to every target face
    pub fn flood(&self, packet: &Packet, arrival: Option<Face>) -> Vec<Outbound> {
        fan_out(packet, self.targets(arrival))
    }

    /// Encode `packet` once and address it to every face without exclusion
    pub fn broadcast(&self, packet: &Packet) -> Vec<Outbound> {
        fan_out(packet, self.all_faces())
    }
}

fn fan_out(packet: &Packet, faces: impl IntoIterator<Item = Face>) -> Vec<Outbound> {
    let frame = packet.encode();
    let outbound: Vec<Outbound> = faces
        .into_iter()
        .map(|face| Outbound {
            face,
            frame: frame.clone(),
        })
        .collect();
    let kind = packet.kind() as char;
    tracing::trace!(kind = %kind, faces = outbound.len(), "fan-out");
    outbound
}
