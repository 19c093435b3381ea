//! Codec benchmarks using Criterion.rs
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use phc_serial::crc::crc16;
use phc_serial::{
    em_config, encode_command, Frame, FrameDecoder, ModuleRegistry, ModuleType, PhcCommand,
    DEFAULT_SHUTTER_TIME,
};

fn bench_crc(c: &mut Criterion) {
    let short = [0x43u8, 0x01, 0x42];
    let long = em_config(0x05).to_bytes();

    c.bench_function("crc16_3_bytes", |b| b.iter(|| crc16(black_box(&short))));
    c.bench_function("crc16_em_config", |b| b.iter(|| crc16(black_box(&long))));
}

fn bench_encode(c: &mut Criterion) {
    c.bench_function("encode_am_on", |b| {
        b.iter(|| {
            let frame = encode_command(
                ModuleType::Am,
                black_box(3),
                black_box(2),
                PhcCommand::On,
                DEFAULT_SHUTTER_TIME,
                false,
            )
            .unwrap();
            black_box(frame.to_bytes())
        });
    });

    c.bench_function("encode_jrm_down", |b| {
        b.iter(|| {
            let frame = encode_command(
                ModuleType::Jrm,
                black_box(1),
                black_box(3),
                PhcCommand::Down,
                black_box(300),
                true,
            )
            .unwrap();
            black_box(frame.to_bytes())
        });
    });
}

fn bench_decoder(c: &mut Criterion) {
    let mut registry = ModuleRegistry::new();
    for dip in 0..8 {
        registry.register(ModuleType::Em, dip).unwrap();
        registry.register(ModuleType::Am, dip).unwrap();
    }

    // 64 input frames with a few noise bytes in between
    let mut stream = Vec::new();
    for i in 0..64u8 {
        let frame = Frame::new(i % 8, vec![((i % 16) << 4) | 0x02], i % 2 == 0).unwrap();
        stream.extend(frame.to_bytes());
        stream.extend([0x99, 0x9A]);
    }

    c.bench_function("decode_64_frames_one_read", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            black_box(decoder.feed(black_box(&stream), &registry))
        });
    });

    c.bench_function("decode_64_frames_8_byte_reads", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut count = 0;
            for chunk in stream.chunks(8) {
                count += decoder.feed(black_box(chunk), &registry).len();
            }
            black_box(count)
        });
    });
}

criterion_group!(benches, bench_crc, bench_encode, bench_decoder);
criterion_main!(benches);
