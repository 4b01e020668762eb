//! Mock mesh for testing
//!
//! Wires any number of in-process endpoints together face to face over
//! Tokio channels. Each face delivers raw chunks which the receiving
//! endpoint re-frames, so framing is exercised exactly as on a real port.

use std::collections::VecDeque;

use pi_mesh_core::traits::Face;
use tokio::sync::{mpsc, Mutex};

use crate::framing::{LineFramer, DEFAULT_MAX_FRAME};
use crate::traits::MeshTransport;
use crate::{Error, Result};

type Chunk = (Face, Vec<u8>);

#[derive(Debug, Clone)]
enum Link {
    /// Face wired to a face of another endpoint
    Peer {
        tx: mpsc::UnboundedSender<Chunk>,
        face: Face,
    },
    /// Face read by the test or the simulator, like a terminal cable
    Tap(mpsc::UnboundedSender<Vec<u8>>),
}

/// A network of interconnected mock endpoints
///
/// Wire faces with [`MockMesh::connect`] and [`MockMesh::tap`] before taking
/// endpoints out.
#[derive(Debug)]
pub struct MockMesh {
    face_count: u8,
    max_frame: usize,
    senders: Vec<mpsc::UnboundedSender<Chunk>>,
    receivers: Vec<Option<mpsc::UnboundedReceiver<Chunk>>>,
    links: Vec<Vec<Option<Link>>>,
}

impl MockMesh {
    /// Create `node_count` unwired endpoints with `face_count` faces each
    pub fn new(node_count: usize, face_count: u8) -> Self {
        let (senders, receivers) = (0..node_count)
            .map(|_| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Some(rx))
            })
            .unzip();

        Self {
            face_count,
            max_frame: DEFAULT_MAX_FRAME,
            senders,
            receivers,
            links: vec![vec![None; usize::from(face_count)]; node_count],
        }
    }

    /// Set the maximum frame length of every endpoint
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Cable `face_a` of node `a` to `face_b` of node `b`
    pub fn connect(&mut self, a: usize, face_a: Face, b: usize, face_b: Face) -> &mut Self {
        self.check(a, face_a);
        self.check(b, face_b);
        self.links[a][face_a.index()] = Some(Link::Peer {
            tx: self.senders[b].clone(),
            face: face_b,
        });
        self.links[b][face_b.index()] = Some(Link::Peer {
            tx: self.senders[a].clone(),
            face: face_a,
        });
        self
    }

    /// Observe everything node `node` writes on `face`
    pub fn tap(&mut self, node: usize, face: Face) -> mpsc::UnboundedReceiver<Vec<u8>> {
        self.check(node, face);
        let (tx, rx) = mpsc::unbounded_channel();
        self.links[node][face.index()] = Some(Link::Tap(tx));
        rx
    }

    /// Handle that feeds bytes into node `node` as if they arrived on a face
    pub fn injector(&self, node: usize) -> Injector {
        Injector {
            tx: self.senders[node].clone(),
            face_count: self.face_count,
        }
    }

    /// Take the endpoint of node `node`
    ///
    /// # Panics
    ///
    /// When the endpoint was already taken.
    pub fn endpoint(&mut self, node: usize) -> MockEndpoint {
        let rx = self.receivers[node]
            .take()
            .unwrap_or_else(|| panic!("endpoint {} already taken", node));
        let framers = (0..self.face_count)
            .map(|_| LineFramer::new(self.max_frame))
            .collect();

        MockEndpoint {
            face_count: self.face_count,
            links: self.links[node].clone(),
            inbox: Mutex::new(Inbox {
                rx,
                framers,
                ready: VecDeque::new(),
            }),
        }
    }

    fn check(&self, node: usize, face: Face) {
        assert!(node < self.senders.len(), "no node {}", node);
        assert!(
            face.index() < usize::from(self.face_count),
            "{} out of range for {} faces",
            face,
            self.face_count
        );
    }
}

/// Writes bytes into an endpoint's inbound side
#[derive(Debug, Clone)]
pub struct Injector {
    tx: mpsc::UnboundedSender<Chunk>,
    face_count: u8,
}

impl Injector {
    /// Deliver `bytes` as arriving on `face`
    pub fn inject(&self, face: Face, bytes: &[u8]) -> Result<()> {
        if face.index() >= usize::from(self.face_count) {
            return Err(Error::FaceOutOfRange {
                face,
                face_count: self.face_count,
            });
        }
        self.tx
            .send((face, bytes.to_vec()))
            .map_err(|_| Error::Closed)
    }
}

#[derive(Debug)]
struct Inbox {
    rx: mpsc::UnboundedReceiver<Chunk>,
    framers: Vec<LineFramer>,
    ready: VecDeque<Chunk>,
}

impl Inbox {
    fn push(&mut self, face: Face, chunk: &[u8]) {
        let framer = &mut self.framers[face.index()];
        framer.extend(chunk);
        while let Some(frame) = framer.next_frame() {
            match frame {
                Ok(frame) => self.ready.push_back((face, frame)),
                Err(err) => tracing::warn!(%face, error = %err, "discarding inbound bytes"),
            }
        }
    }
}

/// One node's side of a [`MockMesh`]
#[derive(Debug)]
pub struct MockEndpoint {
    face_count: u8,
    links: Vec<Option<Link>>,
    inbox: Mutex<Inbox>,
}

#[async_trait::async_trait]
impl MeshTransport for MockEndpoint {
    async fn send(&self, face: Face, frame: &[u8]) -> Result<()> {
        let link = self.links.get(face.index()).ok_or(Error::FaceOutOfRange {
            face,
            face_count: self.face_count,
        })?;

        match link {
            None => {
                tracing::trace!(%face, "face unplugged, frame dropped");
                Ok(())
            }
            Some(Link::Peer { tx, face: remote }) => tx
                .send((*remote, frame.to_vec()))
                .map_err(|_| Error::SendFailed(face)),
            Some(Link::Tap(tx)) => {
                // The tap receiver may already be gone.
                let _ = tx.send(frame.to_vec());
                Ok(())
            }
        }
    }

    async fn recv(&self) -> Result<(Face, Vec<u8>)> {
        let mut inbox = self.inbox.lock().await;
        loop {
            if let Some(frame) = inbox.ready.pop_front() {
                return Ok(frame);
            }
            let (face, chunk) = inbox.rx.recv().await.ok_or(Error::Closed)?;
            inbox.push(face, &chunk);
        }
    }

    async fn drain(&self) -> usize {
        let mut inbox = self.inbox.lock().await;
        let mut dropped = inbox.ready.len();
        inbox.ready.clear();
        while inbox.rx.try_recv().is_ok() {
            dropped += 1;
        }
        for framer in &mut inbox.framers {
            framer.clear();
        }
        dropped
    }

    fn face_count(&self) -> u8 {
        self.face_count
    }
}
