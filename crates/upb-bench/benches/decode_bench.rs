//! Bytecode VM decode benchmarks: the hot loop spec §5 calls out
//! ("decoder VM" among the components whose steady-state throughput
//! matters), exercised against the same builtin schemas the harness
//! scenario tests use.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use upb::{Closure, Decoder};
use upb_harness::{schema_by_name, trace::Recorder};

fn packed_repeated_input(count: usize) -> Vec<u8> {
    // field 4, wire type 2 (length-delimited packed varints).
    let mut payload = Vec::with_capacity(count);
    for i in 0..count {
        payload.push((i % 120) as u8);
    }
    let mut out = vec![0x22];
    encode_varint(payload.len() as u64, &mut out);
    out.extend_from_slice(&payload);
    out
}

fn encode_varint(mut v: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn bench_scalar_single_shot(c: &mut Criterion) {
    let input = [0x08, 0x96, 0x01];
    c.bench_function("decode_scalar_int32_single_shot", |b| {
        b.iter(|| {
            let (group, handlers) = schema_by_name("scalar_int32");
            let mut recorder = Recorder::new();
            let closure = Closure::new(&mut recorder);
            let mut decoder = Decoder::with_default_depth(group, &handlers, closure).unwrap();
            decoder.decode(&input).unwrap();
            decoder.end().unwrap();
            criterion::black_box(recorder);
        });
    });
}

fn bench_repeated_packed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_repeated_packed");
    for &count in &[16usize, 256, 4096] {
        let input = packed_repeated_input(count);
        group.bench_with_input(BenchmarkId::new("elements", count), &input, |b, input| {
            b.iter(|| {
                let (grp, handlers) = schema_by_name("repeated_int32");
                let mut recorder = Recorder::new();
                let closure = Closure::new(&mut recorder);
                let mut decoder = Decoder::with_default_depth(grp, &handlers, closure).unwrap();
                decoder.decode(input).unwrap();
                decoder.end().unwrap();
                criterion::black_box(recorder);
            });
        });
    }
    group.finish();
}

fn bench_chunked_buffer_seams(c: &mut Criterion) {
    let input = packed_repeated_input(256);
    let mut group = c.benchmark_group("decode_buffer_seams");
    for &chunk in &[1usize, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("chunk_size", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let (grp, handlers) = schema_by_name("repeated_int32");
                let mut recorder = Recorder::new();
                let closure = Closure::new(&mut recorder);
                let mut decoder = Decoder::with_default_depth(grp, &handlers, closure).unwrap();
                for piece in input.chunks(chunk) {
                    decoder.decode(piece).unwrap();
                }
                decoder.end().unwrap();
                criterion::black_box(recorder);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scalar_single_shot, bench_repeated_packed, bench_chunked_buffer_seams);
criterion_main!(benches);
