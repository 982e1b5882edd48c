use criterion::{Criterion, criterion_group, criterion_main};
use paper_rag::config::PreprocessingConfig;
use paper_rag::extraction::preprocess_text;
use std::hint::black_box;

fn raw_extraction() -> String {
    (1..=100)
        .map(|page| {
            format!(
                "JOURNAL OF MACHINE LEARNING RESEARCH\n{}\nCode is at https://github.com/example/repo and \
                 questions go to author{}@example.org . . . We compare against baselines --- all of them.\n\
                 The   loss   converges after 2019 epochs.\n\n",
                page, page
            )
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = raw_extraction();
    let config = PreprocessingConfig::default();
    c.bench_function("preprocessing", |b| {
        b.iter(|| preprocess_text(black_box(&text), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
