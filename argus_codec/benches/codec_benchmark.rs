//! Codec benchmark — compile, encode and decode throughput for the format
//! shapes most common on the control network (short command payloads and
//! wide telemetry records).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use argus_codec::Schema;

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for &fmt in &["I:1", "I:3;F:2;C", "B:1;C:2;S:3;I:4;L:5;F:6;D:7;X:8"] {
        group.bench_with_input(BenchmarkId::new("fmt", fmt), &fmt, |b, &fmt| {
            b.iter(|| Schema::compile(fmt, true));
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let schema = Schema::compile("I:3;F:2;C", true);
    group.bench_function("command_line", |b| {
        b.iter(|| schema.encode("1 2 3 4.5 6.25 hello world").unwrap());
    });

    // Wide telemetry record: 64 doubles.
    let wide = Schema::compile("D:64", true);
    let line: String = (0..64)
        .map(|i| format!("{}.5 ", i))
        .collect::<Vec<_>>()
        .join("");
    group.bench_function("telemetry_64d", |b| {
        b.iter(|| wide.encode(&line).unwrap());
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let schema = Schema::compile("I:3;F:2;C", true);
    let blob = schema.encode("1 2 3 4.5 6.25 hello world").unwrap();
    group.bench_function("command_line", |b| {
        b.iter(|| schema.decode_values(&blob).unwrap());
    });

    let wide = Schema::compile("D:64", true);
    let wide_blob = vec![0u8; 64 * 8];
    group.bench_function("telemetry_64d", |b| {
        b.iter(|| wide.decode_values(&wide_blob).unwrap());
    });

    group.bench_function("column_layout_64d", |b| {
        b.iter(|| wide.to_column_layout(&wide_blob).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_compile, bench_encode, bench_decode);
criterion_main!(benches);
