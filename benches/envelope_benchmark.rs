//! Envelope encrypt/decrypt throughput with a resident key.
//!
//! Run with: `cargo bench --bench envelope_benchmark`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use envelock::{derive_key, KdfParams, Salt};

fn bench_envelope(c: &mut Criterion) {
    let salt = Salt::generate(16).unwrap();
    let params = KdfParams {
        iterations: 1_000,
        ..KdfParams::default()
    };
    let key = derive_key("CorrectHorse1!", &salt, &params).unwrap();

    let payload = vec![0u8; 10 * 1024]; // 10KB
    let sealed = key.encrypt(&payload).unwrap();

    let mut group = c.benchmark_group("envelope_10kb");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("encrypt", |b| {
        b.iter(|| key.encrypt(black_box(&payload)).unwrap());
    });
    group.bench_function("decrypt", |b| {
        b.iter(|| key.decrypt(black_box(&sealed)).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_envelope);
criterion_main!(benches);
