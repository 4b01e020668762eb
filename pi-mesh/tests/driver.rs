//! Drivers wired over the mock mesh, on a paused Tokio clock.

use std::time::Duration;

use pi_mesh::core::round::Phase;
use pi_mesh::runtime::tokio_runtime::TokioRuntime;
use pi_mesh::{
    Face, MeshConfig, MeshConfigBuilder, MockEndpoint, MockMesh, NodeDriver, NodeId,
    QuarterCircle, TableSnapshot,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const EAST: Face = Face(0);
const WEST: Face = Face(1);
const TERMINAL: Face = Face(2);

fn config() -> MeshConfig {
    MeshConfigBuilder::new().face_count(3).build().unwrap()
}

fn spawn_node(
    mesh: &mut MockMesh,
    index: usize,
    config: &MeshConfig,
) -> (JoinHandle<()>, watch::Receiver<TableSnapshot>) {
    let source = QuarterCircle::new(StdRng::seed_from_u64(index as u64 + 11), config.radius);
    let driver: NodeDriver<MockEndpoint, _, _> = NodeDriver::new(
        NodeId(0x0a01 + index as u32),
        config.clone(),
        mesh.endpoint(index),
        TokioRuntime::new(),
        source,
    )
    .unwrap();
    let snapshots = driver.subscribe();
    let task = tokio::spawn(async move {
        driver.run().await.unwrap();
    });
    (task, snapshots)
}

fn pair() -> (MockMesh, MeshConfig) {
    let config = config();
    let mut mesh = MockMesh::new(2, config.face_count);
    mesh.connect(0, EAST, 1, WEST);
    (mesh, config)
}

#[tokio::test(start_paused = true)]
async fn two_nodes_complete_the_same_calculation() {
    let (mut mesh, config) = pair();
    let console = mesh.injector(0);
    let (a, snap_a) = spawn_node(&mut mesh, 0, &config);
    let (b, snap_b) = spawn_node(&mut mesh, 1, &config);

    console.inject(TERMINAL, b"d90.0\n").unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;

    for snapshots in [&snap_a, &snap_b] {
        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.phase, Phase::Complete);
        assert!(snapshot.current_accuracy >= 90.0);
        assert!((2.8..3.5).contains(&snapshot.estimate), "estimate {}", snapshot.estimate);
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.active_count(), 2);
    }

    a.abort();
    b.abort();
}

#[tokio::test(start_paused = true)]
async fn table_is_rendered_to_the_requesting_face() {
    let (mut mesh, config) = pair();
    let console = mesh.injector(0);
    let mut screen = mesh.tap(0, TERMINAL);
    let (a, _) = spawn_node(&mut mesh, 0, &config);
    let (b, _) = spawn_node(&mut mesh, 1, &config);

    console.inject(TERMINAL, b"t\n").unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(1), screen.recv())
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame).unwrap();
    assert!(text.contains("PI ACTUAL:"));
    assert!(text.contains("DOA: --"));

    // Peers show up once their heartbeats arrive.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let mut latest = String::new();
    while let Ok(frame) = screen.try_recv() {
        latest = String::from_utf8(frame).unwrap();
    }
    assert!(latest.contains("|0a01"));
    assert!(latest.contains("|0a02"));

    a.abort();
    b.abort();
}

#[tokio::test(start_paused = true)]
async fn reboot_spreads_and_clears_the_calculation() {
    let (mut mesh, config) = pair();
    let console = mesh.injector(0);
    let (a, snap_a) = spawn_node(&mut mesh, 0, &config);
    let (b, snap_b) = spawn_node(&mut mesh, 1, &config);

    console.inject(TERMINAL, b"d90.0\n").unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(snap_b.borrow().version, 1);

    console.inject(TERMINAL, b"x\n").unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    for snapshots in [&snap_a, &snap_b] {
        let snapshot = snapshots.borrow().clone();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.phase, Phase::Idle);
    }

    a.abort();
    b.abort();
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_stop_the_driver() {
    let (mut mesh, config) = pair();
    let console = mesh.injector(0);
    let (a, snap_a) = spawn_node(&mut mesh, 0, &config);
    let (b, _) = spawn_node(&mut mesh, 1, &config);

    console.inject(TERMINAL, b"q\nr,,,\nd\n").unwrap();
    console.inject(TERMINAL, b"d95.5\n").unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(snap_a.borrow().version, 1);
    assert!(!a.is_finished());

    a.abort();
    b.abort();
}
