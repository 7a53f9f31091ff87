//
// reference/engine.rs
//
// The reference engine: owns the index and drives rebuilds, incremental
// updates, queries and provider registration
//

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tokio::sync::Mutex;

use super::collect::collect_document;
use super::config::IndexConfig;
use super::detector::{PatternDetector, TermDetector, TitleDetector};
use super::index::{ApplyReport, ReferenceIndex};
use super::policy::PolicyKind;
use super::provider::{FrontmatterProvider, ProviderHandle, ProviderRegistry, VirtualProvider};
use super::source::DocumentSource;
use super::supersede::{StopSignal, UpdateScheduler};
use super::types::{DocumentId, ReferenceRecord};
use super::view::{DocumentView, ViewCache};
use crate::perf::{RebuildMetrics, TimingGuard};

/// How a full rebuild ended. A stop request is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Completed { processed: usize },
    /// Stopped on request; documents processed before the stop stay indexed
    Interrupted { processed: usize },
}

impl RebuildOutcome {
    pub fn processed(&self) -> usize {
        match self {
            RebuildOutcome::Completed { processed } | RebuildOutcome::Interrupted { processed } => *processed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RebuildOutcome::Completed { .. })
    }
}

/// How an incremental update ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied(ApplyReport),
    /// A newer update for the same document replaced this one
    Superseded,
    /// The document could not be read; its previous records were kept
    Unreadable,
}

/// Summary counters of the current index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub policy: PolicyKind,
    pub documents: usize,
    pub keys: usize,
    pub records: usize,
    pub version: u64,
}

/// Builds and maintains the reference index over a document source.
///
/// Mutations (rebuilds, updates, removals, policy switches) are serialized by
/// an async write gate. Each document's records are gathered outside the
/// index lock and applied in a single short write, so readers always see
/// whole per-document contributions.
pub struct ReferenceEngine {
    source: Arc<dyn DocumentSource>,
    config: IndexConfig,
    detectors: RwLock<Vec<Arc<dyn PatternDetector>>>,
    registry: Arc<ProviderRegistry>,
    builtin_providers: Vec<ProviderHandle>,
    index: Arc<RwLock<ReferenceIndex>>,
    write_gate: Mutex<()>,
    scheduler: UpdateScheduler,
    stop: StopSignal,
    views: ViewCache,
}

impl std::fmt::Debug for ReferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn build_detectors(config: &IndexConfig) -> Vec<Arc<dyn PatternDetector>> {
    let mut detectors: Vec<Arc<dyn PatternDetector>> = Vec::new();
    if config.detect_terms && !config.terms.is_empty() {
        match TermDetector::new(&config.terms) {
            Ok(detector) => detectors.push(Arc::new(detector)),
            Err(e) => log::warn!("Term detector disabled, pattern failed to compile: {}", e),
        }
    }
    if config.detect_titles {
        detectors.push(Arc::new(TitleDetector::new(config.min_title_length)));
    }
    detectors
}

impl ReferenceEngine {
    /// Create an engine over `source`.
    ///
    /// Built-in detectors and the front matter provider are set up from
    /// `config`. Providers in `registry` stay queued until the first
    /// `rebuild_all`.
    pub fn new(source: Arc<dyn DocumentSource>, config: IndexConfig, registry: Arc<ProviderRegistry>) -> Self {
        let detectors = build_detectors(&config);
        let mut builtin_providers = Vec::new();
        if !config.frontmatter_keys.is_empty() {
            builtin_providers.push(registry.register(Arc::new(FrontmatterProvider::new(
                config.frontmatter_keys.clone(),
            ))));
        }
        let index = ReferenceIndex::new(config.canonical_policy());
        log::info!(
            "Reference engine created: policy {}, {} detectors, {} providers registered",
            config.policy,
            detectors.len(),
            registry.len()
        );

        Self {
            source,
            views: ViewCache::new(config.view_cache_capacity),
            config,
            detectors: RwLock::new(detectors),
            registry,
            builtin_providers,
            index: Arc::new(RwLock::new(index)),
            write_gate: Mutex::new(()),
            scheduler: UpdateScheduler::new(),
            stop: StopSignal::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Handles of the providers the engine registered itself
    pub fn builtin_providers(&self) -> &[ProviderHandle] {
        &self.builtin_providers
    }

    fn read_index(&self) -> RwLockReadGuard<'_, ReferenceIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, ReferenceIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn detectors(&self) -> Vec<Arc<dyn PatternDetector>> {
        self.detectors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Add a pattern detector. It contributes from the next document
    /// processed; its corpus state is refreshed on the next rebuild.
    pub fn add_detector(&self, detector: Arc<dyn PatternDetector>) {
        log::trace!("Added pattern detector '{}'", detector.name());
        self.detectors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(detector);
    }

    /// Register a virtual provider. Before the first rebuild the provider is
    /// queued; afterwards it contributes to documents processed from then on.
    pub fn register_provider(&self, provider: Arc<dyn VirtualProvider>) -> ProviderHandle {
        self.registry.register(provider)
    }

    /// Clear the index and recompute every document of the corpus.
    ///
    /// Yields to the runtime after every `rebuild_chunk_size` documents and
    /// checks for a stop request between documents. A stop requested before
    /// the rebuild acquires the write gate interrupts it before anything is
    /// cleared. The stop flag is consumed when the rebuild returns. Only
    /// listing the corpus can fail; per-document failures are logged and
    /// skipped.
    pub async fn rebuild_all(&self) -> anyhow::Result<RebuildOutcome> {
        let _gate = self.write_gate.lock().await;
        if self.stop.take() {
            log::info!("Rebuild skipped, stop was requested before it started");
            return Ok(RebuildOutcome::Interrupted { processed: 0 });
        }
        let _timing = TimingGuard::with_threshold("rebuild_all", 5_000);
        let started = Instant::now();
        self.scheduler.cancel_all();

        let flushed = self.registry.activate();
        if flushed > 0 {
            log::trace!("Provider registry ready with {} queued providers", flushed);
        }

        let documents = self
            .source
            .list_documents()
            .await
            .context("listing documents for rebuild")?;
        let mut metrics = RebuildMetrics {
            scan_duration: Some(started.elapsed()),
            documents: documents.len(),
            ..Default::default()
        };

        let detectors = self.detectors();
        for detector in &detectors {
            detector.refresh(&documents);
        }
        let providers = self.registry.active();

        self.write_index().clear();
        self.views.clear();

        let chunk_size = self.config.rebuild_chunk_size.max(1);
        let mut processed = 0;
        let mut interrupted = false;
        'chunks: for chunk in documents.chunks(chunk_size) {
            for doc in chunk {
                if self.stop.is_requested() {
                    interrupted = true;
                    break 'chunks;
                }
                match collect_document(self.source.as_ref(), &detectors, &providers, doc).await {
                    Ok(collected) => {
                        metrics.contained_errors += collected.errors.len();
                        self.write_index().replace_document(doc, collected.records);
                    }
                    Err(e) => {
                        metrics.contained_errors += 1;
                        e.log();
                    }
                }
                processed += 1;
            }
            tokio::task::yield_now().await;
        }
        self.stop.reset();

        metrics.rebuild_duration = Some(started.elapsed());
        metrics.records = self.read_index().record_count();
        metrics.log_summary();

        if interrupted {
            log::info!(
                "Rebuild stopped after {} of {} documents",
                processed,
                documents.len()
            );
            Ok(RebuildOutcome::Interrupted { processed })
        } else {
            log::info!(
                "Rebuilt reference index: {} documents, {} records in {:?}",
                processed,
                metrics.records,
                started.elapsed()
            );
            Ok(RebuildOutcome::Completed { processed })
        }
    }

    /// Ask the running rebuild, or the next one if none is running, to stop
    /// at the next document boundary
    pub fn request_stop(&self) {
        log::trace!("Stop requested");
        self.stop.request();
    }

    /// The stop flag of this engine, shareable with other tasks
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Recompute one document after it changed.
    ///
    /// If another change of the same document arrives before this one is
    /// applied, this one is discarded.
    pub async fn on_document_changed(&self, doc: &DocumentId) -> UpdateOutcome {
        self.source.note_change(doc, true);
        let ticket = self.scheduler.schedule(doc.clone());
        let detectors = self.detectors();
        let providers = self.registry.active();

        let collected = tokio::select! {
            biased;
            _ = ticket.token.cancelled() => {
                log::trace!("Update {} of {} superseded while collecting", ticket.generation, doc);
                return UpdateOutcome::Superseded;
            }
            result = collect_document(self.source.as_ref(), &detectors, &providers, doc) => result,
        };
        let collected = match collected {
            Ok(collected) => collected,
            Err(e) => {
                e.log();
                self.scheduler.complete(doc, &ticket);
                return UpdateOutcome::Unreadable;
            }
        };

        let _gate = self.write_gate.lock().await;
        if !self.scheduler.is_current(doc, &ticket) {
            log::trace!("Discarding stale update {} of {}", ticket.generation, doc);
            return UpdateOutcome::Superseded;
        }
        let report = self.write_index().replace_document(doc, collected.records);
        self.scheduler.complete(doc, &ticket);
        UpdateOutcome::Applied(report)
    }

    /// Drop everything a deleted document contributed.
    /// Returns the number of records removed.
    pub async fn on_document_deleted(&self, doc: &DocumentId) -> usize {
        self.source.note_change(doc, false);
        self.scheduler.cancel(doc);
        let _gate = self.write_gate.lock().await;
        let removed = self.write_index().remove_document(doc);
        log::trace!("Removed {} records of deleted {}", removed, doc);
        removed
    }

    /// Switch the canonicalization policy. The index is cleared; call
    /// `rebuild_all` to repopulate it under the new policy.
    pub async fn set_active_policy(&self, kind: PolicyKind) {
        let _gate = self.write_gate.lock().await;
        let policy = crate::reference::policy::CanonicalPolicy::new(kind)
            .with_default_extension(self.config.default_extension.clone());
        self.write_index().set_policy(policy);
        self.views.clear();
    }

    pub fn active_policy(&self) -> PolicyKind {
        self.read_index().policy().kind()
    }

    /// Policy-filtered records of `key`, in insertion order
    pub fn query(&self, key: &str) -> Vec<ReferenceRecord> {
        self.read_index().query(key).into_iter().cloned().collect()
    }

    /// Policy-counted references of `key`
    pub fn count(&self, key: &str) -> usize {
        self.read_index().count(key)
    }

    /// Outgoing and incoming references of `doc`, cached per index version
    pub fn document_view(&self, doc: &DocumentId) -> Arc<DocumentView> {
        let index = self.read_index();
        self.views
            .get_or_build(doc, index.version(), || DocumentView::build(&index, doc))
    }

    /// Run `f` against a consistent snapshot of the index
    pub fn with_index<T>(&self, f: impl FnOnce(&ReferenceIndex) -> T) -> T {
        f(&self.read_index())
    }

    pub fn stats(&self) -> IndexStats {
        let index = self.read_index();
        IndexStats {
            policy: index.policy().kind(),
            documents: index.document_count(),
            keys: index.key_count(),
            records: index.record_count(),
            version: index.version(),
        }
    }

    pub fn dump_state(&self) -> String {
        self.read_index().dump_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::source::{MemoryDocument, MemorySource};

    fn engine_over(source: MemorySource) -> ReferenceEngine {
        ReferenceEngine::new(Arc::new(source), IndexConfig::default(), ProviderRegistry::new())
    }

    #[test]
    fn test_build_detectors_from_config() {
        let mut config = IndexConfig::default();
        assert_eq!(build_detectors(&config).len(), 1);

        config.terms.insert("Rust".to_string(), "Rust".to_string());
        let names: Vec<String> = build_detectors(&config)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["terms", "titles"]);

        config.detect_titles = false;
        config.detect_terms = false;
        assert!(build_detectors(&config).is_empty());
    }

    #[test]
    fn test_frontmatter_provider_registered_from_config() {
        let registry = ProviderRegistry::new();
        let engine = ReferenceEngine::new(
            Arc::new(MemorySource::new()),
            IndexConfig::default(),
            registry.clone(),
        );
        assert_eq!(engine.builtin_providers().len(), 1);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_ready());
    }

    #[tokio::test]
    async fn test_rebuild_activates_registry() {
        let engine = engine_over(MemorySource::new());
        let outcome = engine.rebuild_all().await.unwrap();
        assert_eq!(outcome, RebuildOutcome::Completed { processed: 0 });
        assert!(engine.registry().is_ready());
    }

    #[tokio::test]
    async fn test_stats_and_policy_switch() {
        let source = MemorySource::new();
        source.insert("a.md", MemoryDocument::new("").link("Beta", 0));
        let engine = engine_over(source);
        engine.rebuild_all().await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.policy, PolicyKind::CaseInsensitive);
        assert_eq!((stats.documents, stats.keys, stats.records), (1, 1, 1));

        engine.set_active_policy(PolicyKind::BaseName).await;
        assert_eq!(engine.active_policy(), PolicyKind::BaseName);
        assert_eq!(engine.stats().records, 0);

        engine.rebuild_all().await.unwrap();
        assert_eq!(engine.count("beta"), 1);
    }

    #[test]
    fn test_rebuild_outcome_accessors() {
        assert!(RebuildOutcome::Completed { processed: 3 }.is_completed());
        assert_eq!(RebuildOutcome::Interrupted { processed: 2 }.processed(), 2);
    }
}
