use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use gridwire::core::zerocode::{compress, expand};

#[allow(clippy::unwrap_used)]
fn bench_zerocode(c: &mut Criterion) {
    let mut group = c.benchmark_group("zerocode");

    let sizes = [64usize, 512, 1200, 4096];

    for &size in &sizes {
        // Typical message-body shape: zero-heavy with literal islands
        let mut zero_heavy = vec![0u8; size];
        for i in (0..size).step_by(16) {
            zero_heavy[i] = (i & 0xFF) as u8;
        }
        let literal: Vec<u8> = (0..size).map(|i| (i % 251 + 1) as u8).collect();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("compress_zero_heavy_{size}b"), |b| {
            b.iter(|| compress(&zero_heavy))
        });
        group.bench_function(format!("compress_literal_{size}b"), |b| {
            b.iter(|| compress(&literal))
        });

        let coded = compress(&zero_heavy);
        group.bench_function(format!("expand_{size}b"), |b| {
            b.iter(|| {
                let expanded = expand(&coded, size);
                assert!(expanded.is_ok());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_zerocode);
criterion_main!(benches);
