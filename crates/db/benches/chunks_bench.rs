//! Benchmarks for chunk-row merge-upsert throughput.
//!
//! Run with: cargo bench -p db

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use db::{VectorStore, VectorStoreWriter};
use indexer_core::ChunkRow;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const VECTOR_DIM: usize = 8;

fn rows(count: usize) -> Vec<ChunkRow> {
  (0..count)
    .map(|i| {
      let mut row = ChunkRow::new("/docs/bench.txt", 1000, 0, i as i64 * 100, format!("chunk body {i}"), "txt");
      row.vector = Some(vec![0.1; VECTOR_DIM]);
      row
    })
    .collect()
}

fn bench_upsert_chunks(c: &mut Criterion) {
  let rt = Runtime::new().unwrap();
  let mut group = c.benchmark_group("upsert_chunks");

  for batch_size in [8, 32, 128] {
    group.bench_with_input(BenchmarkId::from_parameter(batch_size), &batch_size, |b, &batch_size| {
      b.to_async(&rt).iter_batched(
        || {
          let dir = TempDir::new().unwrap();
          (dir, rows(batch_size))
        },
        |(dir, rows)| async move {
          let store = Arc::new(VectorStore::open_at_path(dir.path().join("bench.lancedb"), VECTOR_DIM).await.unwrap());
          let writer = VectorStoreWriter::spawn(store);
          writer.upsert_chunks(black_box(rows)).await.unwrap();
        },
        criterion::BatchSize::SmallInput,
      );
    });
  }

  group.finish();
}

criterion_group!(benches, bench_upsert_chunks);
criterion_main!(benches);
