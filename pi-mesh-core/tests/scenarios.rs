//! End-to-end behaviour of a node driven through its public entry points

use std::collections::VecDeque;

use pi_mesh_core::codec::{Accuracy, Packet, ResultPacket};
use pi_mesh_core::config::MeshConfig;
use pi_mesh_core::node::{Effects, MeshNode, NodeEvent};
use pi_mesh_core::round::Phase;
use pi_mesh_core::traits::{Face, Millis, NodeId, QuarterCircle, TrialSource};
use pi_mesh_core::Rejection;
use rand::rngs::StdRng;
use rand::SeedableRng;

const A: NodeId = NodeId(0x10);
const B: NodeId = NodeId(0x20);
const C: NodeId = NodeId(0x30);

/// Replays a fixed pattern of outcomes forever
struct Script {
    outcomes: Vec<bool>,
    next: usize,
}

impl Script {
    fn new(outcomes: &[bool]) -> Self {
        Self {
            outcomes: outcomes.to_vec(),
            next: 0,
        }
    }
}

impl TrialSource for Script {
    fn next_trial(&mut self) -> bool {
        let outcome = self.outcomes[self.next % self.outcomes.len()];
        self.next += 1;
        outcome
    }
}

fn result(node: NodeId, time: Millis, version: u32, round: u32, value: u32) -> Packet {
    Packet::Result(ResultPacket {
        node,
        time,
        version,
        round,
        accuracy: Accuracy::new(90, 0),
        value,
    })
}

fn faces_of(effects: &Effects) -> Vec<u8> {
    effects.outbound.iter().map(|o| o.face.0).collect()
}

#[test]
fn single_node_compiles_its_own_round() {
    let mut node = MeshNode::new(A, MeshConfig::default(), 0).unwrap();
    let mut source = QuarterCircle::new(StdRng::seed_from_u64(7), 1000);

    node.handle_frame(Face(0), b"d50.00\n", 10_000).unwrap();
    assert_eq!(node.state().round(), 1);

    let effects = node.sample_batch(&mut source, 10_500, 5000);
    assert_eq!(effects.outbound.len(), 4);
    let inside = node.table().local().result();
    assert!(inside > 0 && inside <= 1000);

    let effects = node.heartbeat(11_000);
    assert_eq!(node.state().phase(), Phase::Complete);
    assert_eq!(node.state().estimate(), 4.0 * (f64::from(inside) / 1000.0));
    assert!(effects
        .events
        .iter()
        .any(|e| matches!(e, NodeEvent::CalculationComplete { elapsed: 1000, .. })));
}

#[test]
fn newer_version_resets_and_resequences() {
    let mut node = MeshNode::new(A, MeshConfig::default(), 0).unwrap();
    for i in 0..3 {
        node.handle_frame(Face(0), b"d90.0\n", 50_000 + i).unwrap();
    }
    assert_eq!(node.state().version(), 3);

    node.handle_packet(result(B, 70_000, 3, 0, 0), Some(Face(1)), 51_000)
        .unwrap();
    let effects = node.heartbeat(52_000);
    assert!(effects.events.contains(&NodeEvent::Joined(B)));

    node.sample_batch(&mut Script::new(&[true, false]), 52_100, 5000);
    assert_eq!(node.table().local().result(), 500);

    let effects = node
        .handle_packet(result(B, 71_000, 5, 1, 640), Some(Face(1)), 52_500)
        .unwrap();
    assert_eq!(faces_of(&effects), vec![0, 2, 3]);
    assert_eq!(node.state().version(), 5);
    assert_eq!(node.state().round(), 1);
    assert_eq!(node.state().sequenced(), 2);
    assert_eq!(node.state().target(), Accuracy::new(90, 0));

    let local = node.table().local();
    assert_eq!(local.result(), 0);
    assert_eq!(local.sequence(), 1);
    let peer = node.table().find(B).unwrap();
    assert_eq!(peer.result(), 640);
    assert_eq!(peer.sequence(), 2);
    assert_eq!(node.liveness().active_set(), &[A, B]);
    assert_eq!(node.table().sequenced_count(), node.state().sequenced());
}

#[test]
fn duplicates_are_dropped_and_later_times_forwarded() {
    let mut node = MeshNode::new(A, MeshConfig::default(), 0).unwrap();

    let first = node
        .handle_packet(result(B, 40_000, 0, 1, 700), Some(Face(2)), 1_000)
        .unwrap();
    assert_eq!(faces_of(&first), vec![0, 1, 3]);

    let again = node.handle_packet(result(B, 40_000, 0, 1, 700), Some(Face(0)), 1_100);
    assert_eq!(
        again,
        Err(Rejection::Duplicate {
            node: B,
            time: 40_000
        })
    );
    assert_eq!(node.table().find(B).unwrap().ping_count(), 1);

    let later = node
        .handle_packet(result(B, 41_000, 0, 1, 710), Some(Face(0)), 1_200)
        .unwrap();
    assert_eq!(faces_of(&later), vec![1, 2, 3]);
    assert_eq!(node.table().find(B).unwrap().result(), 710);
}

#[test]
fn silent_node_is_zeroed_and_not_resequenced() {
    let config = MeshConfig::default();
    let idle = config.idle_threshold_ms;
    let mut node = MeshNode::new(A, config, 0).unwrap();

    node.handle_packet(result(B, 30_000, 0, 1, 650), Some(Face(1)), 1_000)
        .unwrap();
    node.heartbeat(2_000);
    assert!(node.table().find(B).unwrap().is_active());
    assert_eq!(node.table().find(B).unwrap().result(), 650);

    let effects = node.heartbeat(1_000 + idle);
    assert!(effects.events.contains(&NodeEvent::Left(B)));
    let peer = node.table().find(B).unwrap();
    assert!(!peer.is_active());
    assert_eq!(peer.result(), 0);

    node.handle_frame(Face(0), b"d90.0\n", 7_000).unwrap();
    assert_eq!(node.table().find(B).unwrap().sequence(), 0);
    assert_eq!(node.table().local().sequence(), 1);
    assert_eq!(node.state().sequenced(), 1);
    assert_eq!(node.table().sequenced_count(), 1);
    assert!(!node.liveness().active_set().contains(&B));
}

#[test]
fn stale_result_never_moves_accuracy() {
    let config = MeshConfig {
        samples_per_cycle: 100,
        ..MeshConfig::default()
    };
    let mut node = MeshNode::new(A, config, 0).unwrap();
    node.handle_frame(Face(0), b"d99.99\n", 10_000).unwrap();
    node.handle_frame(Face(0), b"d99.99\n", 10_001).unwrap();

    node.sample_batch(&mut Script::new(&[true, true, true, false]), 10_100, 1000);
    node.heartbeat(11_000);
    let accuracy = node.state().current_accuracy();
    assert!(accuracy > 0.0);

    let stale = node.handle_packet(result(B, 60_000, 1, 2, 999), Some(Face(1)), 11_500);
    assert!(matches!(stale, Err(Rejection::Stale { .. })));
    node.heartbeat(12_000);
    assert_eq!(node.state().current_accuracy(), accuracy);
}

#[test]
fn every_active_node_gets_a_unique_sequence() {
    let mut node = MeshNode::new(B, MeshConfig::default(), 0).unwrap();
    for (i, id) in [0x50, 0x05, 0x31, 0x42].into_iter().enumerate() {
        let packet = result(NodeId(id), 90_000, 0, 0, 0);
        node.handle_packet(packet, Some(Face(0)), 1_000 + i as u32)
            .unwrap();
    }
    node.heartbeat(2_000);
    node.handle_frame(Face(0), b"d90.0\n", 2_100).unwrap();

    let mut seqs: Vec<u32> = node.table().iter().map(|n| n.sequence()).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    assert_eq!(node.table().find(NodeId(0x05)).unwrap().sequence(), 1);
    assert_eq!(node.table().find(B).unwrap().sequence(), 2);
}

#[test]
fn flood_on_a_ring_terminates() {
    let config = MeshConfig {
        face_count: 2,
        ..MeshConfig::default()
    };
    let mut nodes: Vec<MeshNode> = [A, B, C]
        .into_iter()
        .map(|id| MeshNode::new(id, config.clone(), 0).unwrap())
        .collect();

    // face 0 of node i faces face 1 of node i + 1
    let peer = |node: usize, face: Face| match face.0 {
        0 => ((node + 1) % 3, Face(1)),
        _ => ((node + 2) % 3, Face(0)),
    };

    let mut queue = VecDeque::new();
    for out in nodes[0].heartbeat(60_000).outbound {
        queue.push_back((0, out));
    }

    let mut deliveries = 0;
    while let Some((from, out)) = queue.pop_front() {
        deliveries += 1;
        assert!(deliveries <= 16, "flood did not terminate");
        let (to, face) = peer(from, out.face);
        if let Ok(effects) = nodes[to].handle_frame(face, &out.frame, 60_100) {
            for next in effects.outbound {
                queue.push_back((to, next));
            }
        }
    }

    assert!(nodes[1].table().find(A).is_some());
    assert!(nodes[2].table().find(A).is_some());
    assert_eq!(nodes[1].table().find(A).unwrap().ping_count(), 1);
}
