//! Benchmarks for the text chunker.
//!
//! Run with: cargo bench -p indexer-core

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use indexer_core::{ChunkerConfig, chunk_text};

fn generate_document(paragraphs: usize) -> String {
  let mut doc = String::new();
  for p in 0..paragraphs {
    doc.push_str(&format!(
      "Paragraph {p} discusses indexing, chunking and retrieval over long-form text documents. "
    ));
    doc.push_str("The quick brown fox jumps over the lazy dog. ".repeat(5).as_str());
    doc.push('\n');
  }
  doc
}

fn bench_chunk_text(c: &mut Criterion) {
  let mut group = c.benchmark_group("chunk_text");
  let config = ChunkerConfig::default();

  for paragraphs in [10, 100, 1000] {
    let doc = generate_document(paragraphs);
    group.throughput(Throughput::Bytes(doc.len() as u64));
    group.bench_with_input(BenchmarkId::from_parameter(paragraphs), &doc, |b, doc| {
      b.iter(|| chunk_text(black_box(doc), black_box(&config)));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_chunk_text);
criterion_main!(benches);
