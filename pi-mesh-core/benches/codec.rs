use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pi_mesh_core::codec::{Accuracy, Packet, ResultPacket};
use pi_mesh_core::traits::NodeId;

fn result_packet() -> Packet {
    Packet::Result(ResultPacket {
        node: NodeId(0xbeef),
        time: 4_294_000,
        version: 17,
        round: 42,
        accuracy: Accuracy::new(99, 95),
        value: 785,
    })
}

fn codec_benchmarks(c: &mut Criterion) {
    let packet = result_packet();
    let frame = packet.encode();

    c.bench_function("encode_result", |b| b.iter(|| black_box(&packet).encode()));
    c.bench_function("decode_result", |b| {
        b.iter(|| Packet::decode(black_box(&frame)))
    });
    c.bench_function("decode_malformed", |b| {
        b.iter(|| Packet::decode(black_box(b"rbeef,4294000,17,x,99.95,785\n")))
    });
}

criterion_group!(benches, codec_benchmarks);
criterion_main!(benches);
