use criterion::{criterion_group, criterion_main, Criterion};
use pubsearch_core::tokenizer::analyze;
use pubsearch_core::InvertedIndex;
use serde_json::json;

const TITLE: &str = "A Comparative Study of Finite Element and Spectral Methods for the \
    Numerical Solution of Nonlinear Partial Differential Equations (2nd ed.)";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("analyze_title", |b| b.iter(|| analyze(TITLE)));
}

fn bench_search(c: &mut Criterion) {
    let mut idx = InvertedIndex::new();
    for i in 0..200u32 {
        idx.ingest(i, json!({
            "title": format!("{TITLE} part {i}"),
            "authors": [format!("Author{}", i % 17), "Jane Doe"],
            "year": 2000 + i % 25,
        }));
    }
    idx.rebuild();
    c.bench_function("rebuild_200", |b| b.iter(|| idx.clone().rebuild()));
    c.bench_function("search_200", |b| b.iter(|| idx.search("spectral methods nonlinear 2010").len()));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
