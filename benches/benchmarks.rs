//! Performance benchmarks for the wsline codec.
//!
//! Run with: `cargo bench`

use std::io::Cursor;
use std::time::Duration;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use wsline::ConnectionTarget;
use wsline::protocol::mask::{apply_mask, apply_mask_fast};
use wsline::protocol::{ClientHandshake, Frame, compute_accept_key};

const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];
const SIZES: [(&str, usize); 3] = [("10b", 10), ("1kb", 1024), ("64kb", 65536)];

// =============================================================================
// Frame Decoding Benchmarks
// =============================================================================

fn bench_frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");

    for (label, size) in SIZES {
        let unmasked = Frame::binary(vec![0xAB; size]).encode(None).to_vec();
        let masked = Frame::binary(vec![0xAB; size]).encode(Some(MASK)).to_vec();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{label}_unmasked"), |b| {
            b.iter(|| {
                Frame::read_from(
                    &mut Cursor::new(black_box(&unmasked)),
                    usize::MAX,
                    Duration::from_secs(1),
                )
            })
        });
        group.bench_function(format!("{label}_masked"), |b| {
            b.iter(|| {
                Frame::read_from(
                    &mut Cursor::new(black_box(&masked)),
                    usize::MAX,
                    Duration::from_secs(1),
                )
            })
        });
    }

    group.finish();
}

// =============================================================================
// Frame Encoding Benchmarks
// =============================================================================

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (label, size) in SIZES {
        let frame = Frame::binary(vec![0xAB; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{label}_masked"), |b| {
            b.iter(|| black_box(&frame).encode(Some(MASK)))
        });
    }

    let text = Frame::text("hi");
    group.bench_function("text_hi_write_to", |b| {
        let mut sink = Vec::with_capacity(64);
        b.iter(|| {
            sink.clear();
            black_box(&text).write_to(&mut sink, Some(MASK))
        })
    });

    group.finish();
}

// =============================================================================
// Masking Benchmarks
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");

    for (label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("apply_mask_{label}"), |b| {
            let mut data = vec![0xAB; size];
            b.iter(|| apply_mask(black_box(&mut data), MASK))
        });
        group.bench_function(format!("apply_mask_fast_{label}"), |b| {
            let mut data = vec![0xAB; size];
            b.iter(|| apply_mask_fast(black_box(&mut data), MASK))
        });
    }

    group.finish();
}

// =============================================================================
// Handshake Benchmarks
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");
    let key = "dGhlIHNhbXBsZSBub25jZQ==";
    let target = ConnectionTarget::parse("ws://example.com:8080/chat").unwrap();
    let handshake = ClientHandshake::with_key(&target, None, &[], key.to_string()).unwrap();
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        compute_accept_key(key)
    )
    .into_bytes();

    group.bench_function("compute_accept_key", |b| {
        b.iter(|| compute_accept_key(black_box(key)))
    });
    group.bench_function("build_request", |b| {
        b.iter(|| ClientHandshake::with_key(black_box(&target), None, &[], key.to_string()))
    });
    group.bench_function("read_response", |b| {
        b.iter(|| handshake.read_response(&mut Cursor::new(black_box(&response)), 8192))
    });
    group.bench_function("parse_uri", |b| {
        b.iter(|| ConnectionTarget::parse(black_box("wss://[::1]:9443/feed?token=abc")))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_decoding,
    bench_frame_encoding,
    bench_masking,
    bench_handshake
);
criterion_main!(benches);
