//
// reference/collect.rs
//
// Gathering the raw reference records of one document from the source,
// pattern detectors and virtual providers
//

use std::sync::Arc;

use super::conflict::resolve_conflicts;
use super::detector::PatternDetector;
use super::error::IndexError;
use super::provider::VirtualProvider;
use super::source::{DocumentMetadata, DocumentSource};
use super::types::{split_subpath, DetectedSpan, DocumentId, Origin, ReferenceRecord};

/// Records gathered for one document plus the contained failures
#[derive(Debug, Default)]
pub struct Collected {
    pub records: Vec<ReferenceRecord>,
    pub errors: Vec<IndexError>,
}

impl Collected {
    fn fail(&mut self, error: IndexError) {
        error.log();
        self.errors.push(error);
    }
}

/// Collect every reference of `doc`.
///
/// Fails only when the document's structured references cannot be read, in
/// which case the document is skipped. Detector and provider failures are
/// logged, recorded in `Collected::errors` and treated as no output.
pub async fn collect_document(
    source: &dyn DocumentSource,
    detectors: &[Arc<dyn PatternDetector>],
    providers: &[Arc<dyn VirtualProvider>],
    doc: &DocumentId,
) -> Result<Collected, IndexError> {
    let structured = source
        .structured_references(doc)
        .await
        .map_err(|source| IndexError::Source {
            doc: doc.clone(),
            source,
        })?;

    let mut collected = Collected {
        records: structured,
        errors: Vec::new(),
    };

    if !detectors.is_empty() {
        match source.cleaned_text(doc).await {
            Ok(text) => {
                let spans = detect_spans(detectors, doc, &text, &mut collected).await;
                collected
                    .records
                    .extend(spans.into_iter().map(|span| span_record(source, doc, span)));
            }
            Err(e) => collected.fail(IndexError::Source {
                doc: doc.clone(),
                source: e,
            }),
        }
    }

    if !providers.is_empty() {
        let metadata = match source.metadata(doc).await {
            Ok(metadata) => metadata,
            Err(e) => {
                collected.fail(IndexError::Source {
                    doc: doc.clone(),
                    source: e,
                });
                DocumentMetadata::default()
            }
        };
        for provider in providers {
            match provider.provide(doc, &metadata, source).await {
                Ok(records) => {
                    log::trace!("Provider '{}' produced {} records for {}", provider.name(), records.len(), doc);
                    collected.records.extend(records.into_iter().map(|mut record| {
                        record.source = doc.clone();
                        record.origin = Origin::Virtual;
                        record
                    }));
                }
                Err(e) => collected.fail(IndexError::Provider {
                    name: provider.name().to_string(),
                    doc: doc.clone(),
                    source: e,
                }),
            }
        }
    }

    Ok(collected)
}

/// Run all detectors and resolve overlaps across their combined output
async fn detect_spans(
    detectors: &[Arc<dyn PatternDetector>],
    doc: &DocumentId,
    text: &str,
    collected: &mut Collected,
) -> Vec<DetectedSpan> {
    let mut candidates = Vec::new();
    for detector in detectors {
        match detector.detect(doc, text).await {
            Ok(spans) => candidates.extend(spans),
            Err(e) => collected.fail(IndexError::Detector {
                name: detector.name().to_string(),
                doc: doc.clone(),
                source: e,
            }),
        }
    }
    let candidate_count = candidates.len();
    let accepted = resolve_conflicts(candidates);
    if candidate_count > 0 {
        log::trace!(
            "Detected {} spans in {} ({} candidates)",
            accepted.len(),
            doc,
            candidate_count
        );
    }
    accepted
}

fn span_record(source: &dyn DocumentSource, doc: &DocumentId, span: DetectedSpan) -> ReferenceRecord {
    let (link, subpath) = split_subpath(&span.target);
    let mut record = ReferenceRecord::new(doc.clone(), link, Origin::Detected)
        .at(span.start)
        .with_display(span.display.clone());
    record.target = source.resolve_link(link, doc);
    record.subpath = subpath.map(str::to_string);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::detector::TermDetector;
    use crate::reference::provider::FrontmatterProvider;
    use crate::reference::source::{MemoryDocument, MemorySource};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use indexmap::IndexMap;

    struct Failing;

    #[async_trait]
    impl PatternDetector for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn detect(&self, _doc: &DocumentId, _text: &str) -> anyhow::Result<Vec<DetectedSpan>> {
            Err(anyhow!("boom"))
        }
    }

    #[async_trait]
    impl VirtualProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn provide(
            &self,
            _doc: &DocumentId,
            _metadata: &DocumentMetadata,
            _source: &dyn DocumentSource,
        ) -> anyhow::Result<Vec<ReferenceRecord>> {
            Err(anyhow!("boom"))
        }
    }

    /// Provider that lies about the record source and origin
    struct Spoofing;

    #[async_trait]
    impl VirtualProvider for Spoofing {
        fn name(&self) -> &str {
            "spoofing"
        }

        async fn provide(
            &self,
            _doc: &DocumentId,
            _metadata: &DocumentMetadata,
            _source: &dyn DocumentSource,
        ) -> anyhow::Result<Vec<ReferenceRecord>> {
            Ok(vec![ReferenceRecord::new(
                DocumentId::new("elsewhere.md"),
                "Beta",
                Origin::StructuredLink,
            )])
        }
    }

    fn corpus() -> MemorySource {
        let source = MemorySource::new();
        source.insert(
            "Alpha.md",
            MemoryDocument::new("Alpha links Beta and mentions machine learning.")
                .link("Beta", 12)
                .field("related", "Gamma"),
        );
        source.insert("Beta.md", MemoryDocument::new(""));
        source.insert("Gamma.md", MemoryDocument::new(""));
        source
    }

    fn terms() -> Arc<dyn PatternDetector> {
        let mut table = IndexMap::new();
        table.insert("machine learning".to_string(), "Gamma#ML".to_string());
        table.insert("learning".to_string(), "Beta".to_string());
        Arc::new(TermDetector::new(&table).unwrap())
    }

    #[tokio::test]
    async fn test_collects_all_origins() {
        let source = corpus();
        let doc = DocumentId::new("Alpha.md");
        let providers: Vec<Arc<dyn VirtualProvider>> =
            vec![Arc::new(FrontmatterProvider::new(vec!["related".to_string()]))];

        let collected = collect_document(&source, &[terms()], &providers, &doc).await.unwrap();
        assert!(collected.errors.is_empty());

        let origins: Vec<Origin> = collected.records.iter().map(|r| r.origin).collect();
        assert_eq!(origins, vec![Origin::StructuredLink, Origin::Detected, Origin::Virtual]);

        let detected = &collected.records[1];
        assert_eq!(detected.raw_text, "Gamma");
        assert_eq!(detected.subpath.as_deref(), Some("ML"));
        assert_eq!(detected.target.as_ref().unwrap().as_str(), "Gamma.md");
        assert_eq!(detected.display.as_deref(), Some("machine learning"));
    }

    #[tokio::test]
    async fn test_failures_are_contained() {
        let source = corpus();
        let doc = DocumentId::new("Alpha.md");
        let detectors: Vec<Arc<dyn PatternDetector>> = vec![Arc::new(Failing), terms()];
        let providers: Vec<Arc<dyn VirtualProvider>> = vec![
            Arc::new(Failing),
            Arc::new(FrontmatterProvider::new(vec!["related".to_string()])),
        ];

        let collected = collect_document(&source, &detectors, &providers, &doc).await.unwrap();
        assert_eq!(collected.errors.len(), 2);
        assert!(matches!(collected.errors[0], IndexError::Detector { .. }));
        assert!(matches!(collected.errors[1], IndexError::Provider { .. }));
        assert_eq!(collected.records.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_records_are_attributed_to_document() {
        let source = corpus();
        let doc = DocumentId::new("Alpha.md");
        let providers: Vec<Arc<dyn VirtualProvider>> = vec![Arc::new(Spoofing)];

        let collected = collect_document(&source, &[], &providers, &doc).await.unwrap();
        let virtual_record = collected.records.last().unwrap();
        assert_eq!(virtual_record.source, doc);
        assert_eq!(virtual_record.origin, Origin::Virtual);
    }

    #[tokio::test]
    async fn test_unreadable_document_is_source_error() {
        let source = corpus();
        let err = collect_document(&source, &[], &[], &DocumentId::new("Missing.md"))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Source { .. }));
    }
}
