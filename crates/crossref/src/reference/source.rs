//
// reference/source.rs
//
// Document access collaborator. The engine and detectors receive a
// `DocumentSource` explicitly; nothing reaches for global host state.
//

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::anyhow;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::policy::DEFAULT_EXTENSION;
use super::types::{split_extension, DocumentId, Origin, ReferenceRecord};

/// Structured per-document data handed to virtual providers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Front matter fields, in document order
    pub frontmatter: IndexMap<String, Vec<String>>,
}

impl DocumentMetadata {
    pub fn values(&self, key: &str) -> &[String] {
        self.frontmatter.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Host-side access to the corpus
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Every document currently in the corpus
    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentId>>;

    /// Explicit links parsed by the host, with positions and resolved targets
    async fn structured_references(&self, doc: &DocumentId) -> anyhow::Result<Vec<ReferenceRecord>>;

    /// Text with code and structured links blanked, for pattern detectors
    async fn cleaned_text(&self, doc: &DocumentId) -> anyhow::Result<String>;

    async fn metadata(&self, doc: &DocumentId) -> anyhow::Result<DocumentMetadata>;

    /// Resolve link text (without anchor) as written in `from` to a document
    fn resolve_link(&self, link: &str, from: &DocumentId) -> Option<DocumentId>;

    /// Called before the engine reprocesses a changed (`exists`) or deleted
    /// document so the source can drop cached state.
    fn note_change(&self, _doc: &DocumentId, _exists: bool) {}
}

/// Case-insensitive lookup table of known documents used for link resolution.
///
/// Resolution order:
/// 1. path relative to the linking document's folder
/// 2. path relative to the corpus root
/// 3. base name anywhere in the corpus: a match in the linking document's
///    folder wins, otherwise the first match in sorted path order
///
/// Steps 1 and 2 also try the default extension when the link has none.
#[derive(Debug, Clone)]
pub struct LinkTable {
    by_path: HashMap<String, DocumentId>,
    by_stem: HashMap<String, Vec<DocumentId>>,
    default_extension: String,
}

impl Default for LinkTable {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl LinkTable {
    pub fn new(default_extension: &str) -> Self {
        Self {
            by_path: HashMap::new(),
            by_stem: HashMap::new(),
            default_extension: default_extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn insert(&mut self, doc: DocumentId) {
        let stem = doc.stem().to_lowercase();
        let entry = self.by_stem.entry(stem).or_default();
        if !entry.contains(&doc) {
            entry.push(doc.clone());
            entry.sort();
        }
        self.by_path.insert(doc.as_str().to_lowercase(), doc);
    }

    pub fn remove(&mut self, doc: &DocumentId) {
        self.by_path.remove(&doc.as_str().to_lowercase());
        let stem = doc.stem().to_lowercase();
        if let Some(entries) = self.by_stem.get_mut(&stem) {
            entries.retain(|d| d != doc);
            if entries.is_empty() {
                self.by_stem.remove(&stem);
            }
        }
    }

    pub fn clear(&mut self) {
        self.by_path.clear();
        self.by_stem.clear();
    }

    pub fn contains(&self, doc: &DocumentId) -> bool {
        self.by_path.contains_key(&doc.as_str().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn resolve(&self, link: &str, from: &DocumentId) -> Option<DocumentId> {
        let link = link.trim().replace('\\', "/");
        if link.is_empty() {
            return None;
        }

        if !link.starts_with('/') {
            if let Some(parent) = from.parent() {
                let joined = normalize_path(&format!("{}/{}", parent, link));
                if let Some(doc) = self.lookup_path(&joined) {
                    return Some(doc);
                }
            }
        }

        let absolute = normalize_path(&link);
        if let Some(doc) = self.lookup_path(&absolute) {
            return Some(doc);
        }

        if absolute.contains('/') {
            return None;
        }
        let file_name = absolute.rsplit('/').next().unwrap_or(&absolute);
        let stem = match split_extension(file_name) {
            (stem, Some(ext)) if ext.eq_ignore_ascii_case(&self.default_extension) => stem,
            (_, Some(_)) => file_name,
            (stem, None) => stem,
        };
        let candidates = self.by_stem.get(&stem.to_lowercase())?;
        candidates
            .iter()
            .find(|c| c.parent() == from.parent())
            .or_else(|| candidates.first())
            .cloned()
    }

    fn lookup_path(&self, path: &str) -> Option<DocumentId> {
        let lower = path.to_lowercase();
        if let Some(doc) = self.by_path.get(&lower) {
            return Some(doc.clone());
        }
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);
        if split_extension(file_name).1.is_none() && !self.default_extension.is_empty() {
            let with_ext = format!("{}.{}", lower, self.default_extension.to_lowercase());
            return self.by_path.get(&with_ext).cloned();
        }
        None
    }
}

/// Collapse `.` and `..` segments and strip leading separators.
/// `..` above the root is dropped.
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// A link stored in a `MemoryDocument`, resolved when references are requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLink {
    pub target: String,
    pub subpath: Option<String>,
    pub position: usize,
}

/// A document held by `MemorySource`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDocument {
    /// Cleaned text (already free of code and structured links)
    pub text: String,
    pub links: Vec<MemoryLink>,
    pub metadata: DocumentMetadata,
}

impl MemoryDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Add a structured link; `target` may carry an anchor (`Alpha#Intro`)
    pub fn link(mut self, target: &str, position: usize) -> Self {
        let (target, subpath) = super::types::split_subpath(target);
        self.links.push(MemoryLink {
            target: target.to_string(),
            subpath: subpath.map(str::to_string),
            position,
        });
        self
    }

    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .frontmatter
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: IndexMap<DocumentId, MemoryDocument>,
    links: LinkTable,
}

/// In-memory corpus. Useful for hosts that already hold parsed documents, and
/// for tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    inner: RwLock<MemoryState>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: impl Into<DocumentId>, document: MemoryDocument) {
        let doc = doc.into();
        if let Ok(mut guard) = self.inner.write() {
            guard.links.insert(doc.clone());
            guard.documents.insert(doc, document);
        }
    }

    pub fn remove(&self, doc: &DocumentId) -> Option<MemoryDocument> {
        let mut guard = self.inner.write().ok()?;
        guard.links.remove(doc);
        guard.documents.shift_remove(doc)
    }

    pub fn contains(&self, doc: &DocumentId) -> bool {
        self.inner
            .read()
            .map(|g| g.documents.contains_key(doc))
            .unwrap_or(false)
    }

    fn with_document<T>(
        &self,
        doc: &DocumentId,
        f: impl FnOnce(&MemoryDocument, &LinkTable) -> T,
    ) -> anyhow::Result<T> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("memory source lock poisoned"))?;
        let document = guard
            .documents
            .get(doc)
            .ok_or_else(|| anyhow!("unknown document: {}", doc))?;
        Ok(f(document, &guard.links))
    }
}

#[async_trait]
impl DocumentSource for MemorySource {
    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentId>> {
        let guard = self
            .inner
            .read()
            .map_err(|_| anyhow!("memory source lock poisoned"))?;
        Ok(guard.documents.keys().cloned().collect())
    }

    async fn structured_references(&self, doc: &DocumentId) -> anyhow::Result<Vec<ReferenceRecord>> {
        self.with_document(doc, |document, links| {
            document
                .links
                .iter()
                .map(|link| {
                    let mut record =
                        ReferenceRecord::new(doc.clone(), link.target.clone(), Origin::StructuredLink)
                            .at(link.position);
                    record.target = links.resolve(&link.target, doc);
                    record.subpath = link.subpath.clone();
                    record
                })
                .collect()
        })
    }

    async fn cleaned_text(&self, doc: &DocumentId) -> anyhow::Result<String> {
        self.with_document(doc, |document, _| document.text.clone())
    }

    async fn metadata(&self, doc: &DocumentId) -> anyhow::Result<DocumentMetadata> {
        self.with_document(doc, |document, _| document.metadata.clone())
    }

    fn resolve_link(&self, link: &str, from: &DocumentId) -> Option<DocumentId> {
        self.inner.read().ok()?.links.resolve(link, from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(docs: &[&str]) -> LinkTable {
        let mut table = LinkTable::default();
        for doc in docs {
            table.insert(DocumentId::new(*doc));
        }
        table
    }

    #[test]
    fn test_resolve_relative_then_absolute() {
        let t = table(&["notes/Alpha.md", "Alpha.md", "notes/sub/Beta.md"]);
        let from = DocumentId::new("notes/index.md");
        assert_eq!(t.resolve("Alpha", &from).unwrap().as_str(), "notes/Alpha.md");
        assert_eq!(t.resolve("/Alpha", &from).unwrap().as_str(), "Alpha.md");
        assert_eq!(t.resolve("sub/beta.md", &from).unwrap().as_str(), "notes/sub/Beta.md");
        assert_eq!(
            t.resolve("../Alpha", &DocumentId::new("notes/sub/Beta.md")).unwrap().as_str(),
            "notes/Alpha.md"
        );
    }

    #[test]
    fn test_resolve_by_basename() {
        let t = table(&["deep/nested/Gamma.md", "other/Delta.md"]);
        let from = DocumentId::new("index.md");
        assert_eq!(t.resolve("gamma", &from).unwrap().as_str(), "deep/nested/Gamma.md");
        assert_eq!(t.resolve("Gamma.md", &from).unwrap().as_str(), "deep/nested/Gamma.md");
        assert!(t.resolve("missing", &from).is_none());
        // Paths with folders never fall back to basename matching
        assert!(t.resolve("wrong/Gamma", &from).is_none());
    }

    #[test]
    fn test_basename_prefers_same_folder() {
        let t = table(&["a/Topic.md", "b/Topic.md"]);
        assert_eq!(
            t.resolve("Topic", &DocumentId::new("b/index.md")).unwrap().as_str(),
            "b/Topic.md"
        );
        assert_eq!(
            t.resolve("Topic", &DocumentId::new("c/index.md")).unwrap().as_str(),
            "a/Topic.md"
        );
    }

    #[test]
    fn test_ambiguous_basename_takes_first_sorted_path() {
        let mut t = table(&["z/Topic.md", "m/Topic.md"]);
        t.insert(DocumentId::new("a/Topic.md"));
        let from = DocumentId::new("index.md");
        assert_eq!(t.resolve("Topic", &from).unwrap().as_str(), "a/Topic.md");

        t.remove(&DocumentId::new("a/Topic.md"));
        assert_eq!(t.resolve("topic.md", &from).unwrap().as_str(), "m/Topic.md");
    }

    #[test]
    fn test_remove_forgets_document() {
        let mut t = table(&["Alpha.md"]);
        let from = DocumentId::new("x.md");
        assert!(t.resolve("Alpha", &from).is_some());
        t.remove(&DocumentId::new("Alpha.md"));
        assert!(t.resolve("Alpha", &from).is_none());
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn test_memory_source_resolves_links_lazily() {
        let source = MemorySource::new();
        source.insert("a.md", MemoryDocument::new("text").link("Future#Plan", 3));

        let refs = source.structured_references(&DocumentId::new("a.md")).await.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, None);
        assert_eq!(refs[0].subpath.as_deref(), Some("Plan"));
        assert_eq!(refs[0].position, 3);

        source.insert("Future.md", MemoryDocument::new(""));
        let refs = source.structured_references(&DocumentId::new("a.md")).await.unwrap();
        assert_eq!(refs[0].target.as_ref().map(|d| d.as_str()), Some("Future.md"));
    }

    #[tokio::test]
    async fn test_memory_source_unknown_document_errors() {
        let source = MemorySource::new();
        assert!(source.cleaned_text(&DocumentId::new("nope.md")).await.is_err());
    }
}
