//
// reference/detector.rs
//
// Pattern detectors: find implicit references in a document's cleaned text
//

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};

use super::types::{DetectedSpan, DocumentId};

/// Upper bound on compiled alternation size for large corpora
const PATTERN_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Produces candidate implicit references for one document.
///
/// Output of all detectors is concatenated and passed through
/// `resolve_conflicts` before indexing; detectors need not avoid overlaps.
#[async_trait]
pub trait PatternDetector: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(&self, doc: &DocumentId, cleaned_text: &str) -> anyhow::Result<Vec<DetectedSpan>>;

    /// Refresh corpus-derived state before a full rebuild
    fn refresh(&self, _documents: &[DocumentId]) {}
}

/// Build a case-insensitive, word-bounded alternation. Longer phrases come
/// first so the leftmost match prefers them.
fn build_alternation<'a>(phrases: impl Iterator<Item = &'a str>) -> Result<Option<Regex>, regex::Error> {
    let mut phrases: Vec<&str> = phrases.filter(|p| !p.trim().is_empty()).collect();
    if phrases.is_empty() {
        return Ok(None);
    }
    phrases.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    phrases.dedup();
    let body = phrases
        .iter()
        .map(|p| regex::escape(p.trim()))
        .collect::<Vec<_>>()
        .join("|");
    RegexBuilder::new(&format!(r"\b(?:{})\b", body))
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map(Some)
}

/// Matches a fixed table of terms, each pointing at a target link.
#[derive(Debug)]
pub struct TermDetector {
    pattern: Option<Regex>,
    targets: HashMap<String, String>,
}

impl TermDetector {
    /// `terms` maps phrase -> target link text
    pub fn new(terms: &IndexMap<String, String>) -> Result<Self, regex::Error> {
        let pattern = build_alternation(terms.keys().map(String::as_str))?;
        let targets = terms
            .iter()
            .map(|(term, target)| (term.trim().to_lowercase(), target.clone()))
            .collect();
        Ok(Self { pattern, targets })
    }
}

#[async_trait]
impl PatternDetector for TermDetector {
    fn name(&self) -> &str {
        "terms"
    }

    async fn detect(&self, _doc: &DocumentId, cleaned_text: &str) -> anyhow::Result<Vec<DetectedSpan>> {
        let Some(pattern) = &self.pattern else {
            return Ok(Vec::new());
        };
        pattern
            .find_iter(cleaned_text)
            .map(|m| {
                let target = self
                    .targets
                    .get(&m.as_str().to_lowercase())
                    .ok_or_else(|| anyhow!("matched term {:?} has no target", m.as_str()))?;
                Ok(DetectedSpan::new(m.start(), m.end(), m.as_str(), target.clone()))
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct TitleTable {
    pattern: Option<Regex>,
    by_title: HashMap<String, DocumentId>,
}

/// Matches the titles (file stems) of documents in the corpus.
///
/// The title table is rebuilt by `refresh`; mentions of a document inside
/// itself are skipped. When two documents share a title the first one in
/// sorted order wins.
#[derive(Debug)]
pub struct TitleDetector {
    min_title_len: usize,
    table: RwLock<TitleTable>,
}

impl TitleDetector {
    pub fn new(min_title_len: usize) -> Self {
        Self {
            min_title_len,
            table: RwLock::new(TitleTable::default()),
        }
    }
}

#[async_trait]
impl PatternDetector for TitleDetector {
    fn name(&self) -> &str {
        "titles"
    }

    async fn detect(&self, doc: &DocumentId, cleaned_text: &str) -> anyhow::Result<Vec<DetectedSpan>> {
        let table = self
            .table
            .read()
            .map_err(|_| anyhow!("title table lock poisoned"))?;
        let Some(pattern) = &table.pattern else {
            return Ok(Vec::new());
        };

        let mut spans = Vec::new();
        for m in pattern.find_iter(cleaned_text) {
            let Some(target) = table.by_title.get(&m.as_str().to_lowercase()) else {
                continue;
            };
            if target == doc {
                continue;
            }
            spans.push(DetectedSpan::new(m.start(), m.end(), m.as_str(), target.as_str()));
        }
        Ok(spans)
    }

    fn refresh(&self, documents: &[DocumentId]) {
        let mut sorted: Vec<&DocumentId> = documents.iter().collect();
        sorted.sort();

        let mut by_title: HashMap<String, DocumentId> = HashMap::new();
        for doc in sorted {
            let title = doc.stem().trim();
            if title.chars().count() < self.min_title_len {
                continue;
            }
            by_title
                .entry(title.to_lowercase())
                .or_insert_with(|| doc.clone());
        }

        let pattern = match build_alternation(by_title.keys().map(String::as_str)) {
            Ok(pattern) => pattern,
            Err(e) => {
                log::warn!("Failed to compile title pattern for {} titles: {}", by_title.len(), e);
                None
            }
        };
        log::trace!("Title detector refreshed with {} titles", by_title.len());

        if let Ok(mut table) = self.table.write() {
            *table = TitleTable { pattern, by_title };
        }
    }
}
