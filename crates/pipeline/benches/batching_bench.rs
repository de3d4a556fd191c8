//! Benchmarks for the Embedding Queue's batching math.
//!
//! Run with: cargo bench -p pipeline --bench batching_bench

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pipeline::estimate_tokens;

fn bench_estimate_tokens(c: &mut Criterion) {
  let mut group = c.benchmark_group("estimate_tokens");

  for size in [32, 256, 1000, 8000] {
    let text = "a".repeat(size);
    group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
      b.iter(|| black_box(estimate_tokens(black_box(text))));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_estimate_tokens);
criterion_main!(benches);
