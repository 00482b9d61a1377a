//! Performance benchmarks for the wsclient protocol core.
//!
//! Run with: `cargo bench`

use bytes::BytesMut;
use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use wsclient::connection::Role;
use wsclient::protocol::frame::{FrameDecoder, FrameEncoder, MAX_HEADER_SIZE};
use wsclient::protocol::handshake::{ClientHandshake, compute_accept_key};
use wsclient::protocol::mask::{apply_mask, apply_mask_fast};
use wsclient::protocol::{Frame, OpCode, StreamReassembler};
use wsclient::{Config, ConnectionOptions, Limits};

// =============================================================================
// Frame decoding
// =============================================================================

fn server_frame(payload_size: usize) -> Vec<u8> {
    let mut buf = BytesMut::new();
    Frame::binary(vec![0xABu8; payload_size]).encode(&mut buf);
    buf.to_vec()
}

fn bench_frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");
    let decoder = FrameDecoder::new(Role::Client, Limits::default());

    for (name, size) in [("small_10b", 10), ("medium_1kb", 1024), ("large_64kb", 65536)] {
        let wire = server_frame(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(name, |b| b.iter(|| decoder.decode(black_box(&wire))));
    }

    group.finish();
}

// =============================================================================
// Frame encoding (masked, client role)
// =============================================================================

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");
    let encoder = FrameEncoder::new(Role::Client);

    for (name, size) in [("small_10b", 10), ("medium_1kb", 1024), ("large_64kb", 65536)] {
        let frame = Frame::binary(vec![0xABu8; size]);
        let mut dst = BytesMut::with_capacity(size + MAX_HEADER_SIZE);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                dst.clear();
                encoder.encode(black_box(frame.clone()), &mut dst).unwrap();
            })
        });
    }

    group.finish();
}

// =============================================================================
// Masking
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");
    let mask = [0x37, 0xfa, 0x21, 0x3d];

    for (name, size) in [("64b", 64), ("1kb", 1024), ("64kb", 65536)] {
        let mut data = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("apply_mask_{name}"), |b| {
            b.iter(|| apply_mask(black_box(&mut data), mask))
        });
        group.bench_function(format!("apply_mask_fast_{name}"), |b| {
            b.iter(|| apply_mask_fast(black_box(&mut data), mask))
        });
    }

    group.finish();
}

// =============================================================================
// Stream reassembly
// =============================================================================

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembly");
    let config = Config::default();

    let single = server_frame(65536);

    let payload = vec![0xABu8; 65536];
    let mut fragmented = BytesMut::new();
    for (i, chunk) in payload.chunks(6554).enumerate() {
        let opcode = if i == 0 { OpCode::Binary } else { OpCode::Continuation };
        let fin = (i + 1) * 6554 >= payload.len();
        Frame::new(fin, opcode, chunk.to_vec()).encode(&mut fragmented);
    }

    group.throughput(Throughput::Bytes(65536));
    group.bench_function("single_frame_64kb", |b| {
        b.iter_batched(
            || {
                let mut reassembler = StreamReassembler::new(&config);
                reassembler.begin_frames();
                reassembler
            },
            |mut reassembler| {
                reassembler.extend(&single).unwrap();
                reassembler.next_event().unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("10_fragments_64kb", |b| {
        b.iter_batched(
            || {
                let mut reassembler = StreamReassembler::new(&config);
                reassembler.begin_frames();
                reassembler
            },
            |mut reassembler| {
                reassembler.extend(&fragmented).unwrap();
                reassembler.next_event().unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("1kb_reads_64kb", |b| {
        b.iter_batched(
            || {
                let mut reassembler = StreamReassembler::new(&config);
                reassembler.begin_frames();
                reassembler
            },
            |mut reassembler| {
                let mut message = None;
                for chunk in single.chunks(1024) {
                    reassembler.extend(chunk).unwrap();
                    if let Some(event) = reassembler.next_event().unwrap() {
                        message = Some(event);
                    }
                }
                message
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

// =============================================================================
// Handshake
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");
    let key = "dGhlIHNhbXBsZSBub25jZQ==";

    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(key)))
    });

    let handshake = ClientHandshake::with_key(key);
    let options = ConnectionOptions::new("example.com", 80).with_path("/chat");
    group.bench_function("build_request", |b| {
        b.iter(|| handshake.build_request(black_box(&options)).unwrap())
    });

    let response = b"HTTP/1.1 101 Switching Protocols\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";
    group.bench_function("validate_response", |b| {
        b.iter(|| handshake.validate_response(black_box(response)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_frame_encoding,
    bench_masking,
    bench_reassembly,
    bench_handshake
);
criterion_main!(benches);
