// rebuild.rs - Performance benchmarks for reference index rebuilds and updates
//
// Run with: cargo bench --features test-support --bench rebuild
// Compare baselines: cargo bench --features test-support --bench rebuild -- --baseline before

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use crossref::reference::{
    DocumentId, FsSource, IndexConfig, PolicyKind, ProviderRegistry, ReferenceEngine,
};
use crossref::test_utils::fixture_corpus::{
    create_fixture_corpus, fixture_path, FixtureConfig,
};

fn engine_for(root: &std::path::Path, policy: PolicyKind) -> ReferenceEngine {
    let config = IndexConfig {
        policy,
        ..IndexConfig::default()
    };
    let source = Arc::new(FsSource::new(root, &config.extensions));
    ReferenceEngine::new(source, config, ProviderRegistry::new())
}

fn doc_id(index: usize, config: &FixtureConfig) -> DocumentId {
    DocumentId::new(fixture_path(index, config).to_string_lossy())
}

// ---------------------------------------------------------------------------
// Benchmark: full rebuild per corpus size
// ---------------------------------------------------------------------------

fn bench_full_rebuild(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("full_rebuild");
    group.sample_size(20);

    for (label, config) in [
        ("small", FixtureConfig::small()),
        ("medium", FixtureConfig::medium()),
        ("large", FixtureConfig::large()),
    ] {
        let corpus = create_fixture_corpus(&config).expect("fixture corpus");
        let engine = engine_for(corpus.path(), PolicyKind::CaseInsensitive);

        group.bench_with_input(BenchmarkId::from_parameter(label), &engine, |b, engine| {
            b.to_async(&rt).iter(|| async move {
                black_box(engine.rebuild_all().await.expect("rebuild"));
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: rebuild of the medium corpus under every policy
// ---------------------------------------------------------------------------

fn bench_policies(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let config = FixtureConfig::medium();
    let corpus = create_fixture_corpus(&config).expect("fixture corpus");
    let mut group = c.benchmark_group("rebuild_by_policy");
    group.sample_size(20);

    for kind in PolicyKind::ALL {
        let engine = engine_for(corpus.path(), kind);
        group.bench_with_input(BenchmarkId::from_parameter(kind), &engine, |b, engine| {
            b.to_async(&rt).iter(|| async move {
                black_box(engine.rebuild_all().await.expect("rebuild"));
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: incremental update, query and view on a built index
// ---------------------------------------------------------------------------

fn bench_incremental(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let config = FixtureConfig::medium();
    let corpus = create_fixture_corpus(&config).expect("fixture corpus");
    let engine = engine_for(corpus.path(), PolicyKind::CaseInsensitive);
    rt.block_on(engine.rebuild_all()).expect("initial rebuild");

    let changed = doc_id(7, &config);
    let key = doc_id(3, &config).as_str().to_lowercase();
    let mut group = c.benchmark_group("incremental");

    group.bench_function("on_document_changed", |b| {
        let (engine, changed) = (&engine, &changed);
        b.to_async(&rt).iter(|| async move {
            black_box(engine.on_document_changed(changed).await);
        });
    });

    group.bench_function("query", |b| {
        b.iter(|| black_box(engine.query(black_box(&key))));
    });

    group.bench_function("document_view", |b| {
        let target = doc_id(3, &config);
        b.iter(|| black_box(engine.document_view(black_box(&target))));
    });

    group.finish();
}

criterion_group!(benches, bench_full_rebuild, bench_policies, bench_incremental);
criterion_main!(benches);
