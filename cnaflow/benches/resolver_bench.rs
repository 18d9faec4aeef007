//! Benchmarks for key derivation and need resolution.

use cnaflow::cache::CacheKeyBuilder;
use cnaflow::context::{CellCycleBranch, EmbeddingSelection, RunConfig};
use cnaflow::pipeline::{BranchSelector, NeedResolver};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;

fn resolver_benchmark(c: &mut Criterion) {
    let config = RunConfig::new("bench")
        .with_cell_cycle(CellCycleBranch::Detect { sd_threshold: 3.0 })
        .with_embedding(EmbeddingSelection::Both);
    let Ok(graph) = BranchSelector::from_config(&config).build_graph("bench") else {
        return;
    };
    let builder = CacheKeyBuilder::new("bench");

    c.bench_function("cache_keys", |b| {
        b.iter(|| black_box(graph.cache_keys(&builder, &config)));
    });

    let half_cached: HashMap<String, bool> = graph
        .execution_order()
        .iter()
        .enumerate()
        .map(|(i, stage)| (stage.clone(), i < graph.stage_count() / 2))
        .collect();
    c.bench_function("resolve_marks", |b| {
        b.iter(|| black_box(NeedResolver::resolve_marks(&graph, &half_cached)));
    });
}

criterion_group!(benches, resolver_benchmark);
criterion_main!(benches);
