use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ipcr_core::packet::control::ones_complement_checksum;
use ipcr_core::{
    ControlPacket, Header, PacketType, ServerRecord, SockAddr, WireVersion, decode, encode,
    peek_frame_size,
};

fn data_header(version: WireVersion) -> Header {
    Header::new(
        version,
        PacketType::Data,
        SockAddr::new(1, 0x4000),
        SockAddr::new(2, 0x4001),
    )
}

fn bench_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");

    for version in [WireVersion::V1, WireVersion::V2] {
        let header = data_header(version);
        for size in [16usize, 256, 4096] {
            let payload = vec![0xAB; size];
            let raw = encode(&header, &payload).unwrap();
            let label = format!("{version:?}/{size}");
            group.throughput(Throughput::Bytes(raw.len() as u64));

            group.bench_with_input(BenchmarkId::new("encode", &label), &payload, |b, p| {
                b.iter(|| encode(&header, p).unwrap());
            });
            group.bench_with_input(BenchmarkId::new("decode", &label), &raw, |b, r| {
                b.iter(|| decode(r).unwrap());
            });
        }
    }

    let raw = encode(&data_header(WireVersion::V1), &[0u8; 64]).unwrap();
    group.bench_function("peek_frame_size", |b| {
        b.iter(|| peek_frame_size(&raw).unwrap());
    });

    group.finish();
}

fn bench_control(c: &mut Criterion) {
    let mut group = c.benchmark_group("control");

    let server = ControlPacket::NewServer(ServerRecord {
        service: 42,
        instance: 1,
        node: 3,
        port: 0x4000,
    });
    let server_raw = server.encode();
    let proc_raw = ControlPacket::DelProc { node: 7 }.encode();

    group.bench_function("encode_new_server", |b| b.iter(|| server.encode()));
    group.bench_function("decode_new_server", |b| {
        b.iter(|| ControlPacket::decode(&server_raw).unwrap());
    });
    group.bench_function("decode_del_proc", |b| {
        b.iter(|| ControlPacket::decode(&proc_raw).unwrap());
    });
    group.bench_function("checksum_20", |b| {
        b.iter(|| ones_complement_checksum(&proc_raw));
    });

    group.finish();
}

criterion_group!(benches, bench_header, bench_control);
criterion_main!(benches);
