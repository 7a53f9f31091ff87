//! End-to-end tests of the public engine API over a directory of markdown
//! files.
//!
//! Run with: `cargo test -p crossref --test corpus_integration`

use std::path::Path;
use std::sync::Arc;

use crossref::reference::{
    DocumentId, FsSource, IndexConfig, Origin, PolicyKind, ProviderRegistry, RebuildOutcome,
    ReferenceEngine, UpdateOutcome,
};
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

/// Three documents: front matter, wikilinks, an unresolved link and plain
/// title mentions.
fn corpus() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "notes/Alpha Project.md",
        "---\nrelated: [[Beta]]\n---\n# Alpha Project\n\nSee [[Beta#Setup]] and [[missing page]].\n",
    );
    write(
        dir.path(),
        "Beta.md",
        "Beta builds on the Alpha Project; see alpha project notes.\n",
    );
    write(dir.path(), "gamma.md", "[[beta]] and [[BETA]]\n");
    dir
}

fn engine_for(root: &Path, policy: PolicyKind) -> ReferenceEngine {
    let config = IndexConfig {
        policy,
        ..IndexConfig::default()
    };
    let source = Arc::new(FsSource::new(root, &config.extensions));
    ReferenceEngine::new(source, config, ProviderRegistry::new())
}

fn doc(path: &str) -> DocumentId {
    DocumentId::new(path)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn rebuild_collects_every_origin() {
    let dir = corpus();
    let engine = engine_for(dir.path(), PolicyKind::CaseInsensitive);

    let outcome = engine.rebuild_all().await.unwrap();
    assert_eq!(outcome, RebuildOutcome::Completed { processed: 3 });

    let stats = engine.stats();
    assert_eq!(stats.records, 7);
    assert_eq!(stats.documents, 3);

    // two case variants from gamma, then Alpha's front matter
    let beta = engine.query("beta.md");
    assert_eq!(beta.len(), 3);
    assert!(beta[..2].iter().all(|r| r.source == doc("gamma.md")));
    assert_eq!(beta[2].origin, Origin::Virtual);
    assert_eq!(beta[2].source, doc("notes/Alpha Project.md"));

    let anchored = engine.query("beta.md#setup");
    assert_eq!(anchored.len(), 1);
    assert_eq!(anchored[0].target, Some(doc("Beta.md")));

    let mentions = engine.query("notes/alpha project.md");
    assert_eq!(mentions.len(), 2);
    assert!(mentions.iter().all(|r| r.origin == Origin::Detected));
    assert!(mentions[0].position < mentions[1].position);
}

#[tokio::test]
async fn policies_group_the_same_records_differently() {
    let dir = corpus();

    let unique = engine_for(dir.path(), PolicyKind::UniqueSource);
    unique.rebuild_all().await.unwrap();
    assert_eq!(unique.count("beta.md"), 2);

    let per_source = engine_for(dir.path(), PolicyKind::PerSourceFile);
    per_source.rebuild_all().await.unwrap();
    assert_eq!(per_source.count("gamma.md:beta.md"), 2);
    assert_eq!(per_source.count("beta.md"), 0);

    let basename = engine_for(dir.path(), PolicyKind::BaseName);
    basename.rebuild_all().await.unwrap();
    assert_eq!(basename.count("beta"), 3);
    assert_eq!(basename.count("alpha project"), 2);

    for engine in [&unique, &per_source, &basename] {
        assert_eq!(engine.stats().records, 7, "policy {}", engine.active_policy());
    }
}

#[tokio::test]
async fn switching_policy_requires_rebuild() {
    let dir = corpus();
    let engine = engine_for(dir.path(), PolicyKind::CaseSensitive);
    engine.rebuild_all().await.unwrap();
    assert_eq!(engine.count("Beta.md"), 3);

    engine.set_active_policy(PolicyKind::UniqueSource).await;
    assert_eq!(engine.stats().records, 0);

    engine.rebuild_all().await.unwrap();
    assert_eq!(engine.active_policy(), PolicyKind::UniqueSource);
    assert_eq!(engine.count("beta.md"), 2);
}

#[tokio::test]
async fn file_changes_update_views() {
    let dir = corpus();
    let engine = engine_for(dir.path(), PolicyKind::CaseInsensitive);
    engine.rebuild_all().await.unwrap();

    let view = engine.document_view(&doc("Beta.md"));
    assert_eq!(view.incoming_count(), 4);
    assert_eq!(view.outgoing.len(), 2);

    write(dir.path(), "gamma.md", "Nothing links anywhere now.\n");
    let outcome = engine.on_document_changed(&doc("gamma.md")).await;
    assert!(matches!(outcome, UpdateOutcome::Applied(report) if report.removed == 2));

    let view = engine.document_view(&doc("Beta.md"));
    assert_eq!(view.incoming_count(), 2);

    // creating the missing page picks up the earlier unresolved link
    write(dir.path(), "missing page.md", "Now it exists.\n");
    engine.on_document_changed(&doc("missing page.md")).await;
    let view = engine.document_view(&doc("missing page.md"));
    assert_eq!(view.incoming_count(), 1);

    std::fs::remove_file(dir.path().join("notes/Alpha Project.md")).unwrap();
    let removed = engine.on_document_deleted(&doc("notes/Alpha Project.md")).await;
    assert_eq!(removed, 3);
    assert_eq!(engine.document_view(&doc("missing page.md")).incoming_count(), 0);
}

#[tokio::test]
async fn dump_state_lists_keys() {
    let dir = corpus();
    let engine = engine_for(dir.path(), PolicyKind::CaseInsensitive);
    engine.rebuild_all().await.unwrap();

    let dump = engine.dump_state();
    assert!(dump.starts_with("Reference Index State"));
    assert!(dump.contains("beta.md (count 3):"));
    assert!(dump.contains("<unresolved>"));
}
