use criterion::{Criterion, criterion_group, criterion_main};
use paper_rag::embeddings::chunking::{ChunkingConfig, chunk_document};
use paper_rag::store::SourceMetadata;
use std::hint::black_box;

fn synthetic_paper() -> String {
    let paragraph = "We train a graph neural network on protein structures. The model predicts \
                     residue contacts with high precision, and ablations show that attention \
                     over pair features matters most. Results are reported on CASP14 targets.";
    (0..200)
        .map(|i| format!("Section {}.\n{}\n\n", i, paragraph))
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = synthetic_paper();
    let source = SourceMetadata {
        filename: "bench_2024.pdf".to_string(),
        title: "bench".to_string(),
        year: Some("2024".to_string()),
        file_path: "/papers/bench_2024.pdf".to_string(),
        file_size: 0,
    };
    let config = ChunkingConfig::default();
    c.bench_function("chunking", |b| {
        b.iter(|| chunk_document(black_box(&text), black_box(&source), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
