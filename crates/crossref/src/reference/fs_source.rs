//
// reference/fs_source.rs
//
// File-system backed document source: a directory of markdown-like files
//

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use lru::LruCache;
use walkdir::{DirEntry, WalkDir};

use super::markdown::{clean_text, parse_frontmatter, parse_links, ParsedLink};
use super::source::{DocumentMetadata, DocumentSource, LinkTable};
use super::types::{DocumentId, Origin, ReferenceRecord};

/// Default capacity for the parsed document cache
const DEFAULT_PARSE_CACHE_CAPACITY: usize = 512;

/// Everything derived from one read of a file
#[derive(Debug)]
struct ParsedDocument {
    links: Vec<ParsedLink>,
    cleaned: String,
    metadata: DocumentMetadata,
}

impl ParsedDocument {
    fn parse(text: &str) -> Self {
        Self {
            links: parse_links(text),
            cleaned: clean_text(text),
            metadata: DocumentMetadata {
                frontmatter: parse_frontmatter(text),
            },
        }
    }
}

/// Document source reading files under a root directory.
///
/// Parsed files are cached (LRU) until `note_change` reports them changed.
pub struct FsSource {
    root: PathBuf,
    extensions: Vec<String>,
    links: RwLock<LinkTable>,
    cache: RwLock<LruCache<DocumentId, Arc<ParsedDocument>>>,
}

impl std::fmt::Debug for FsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsSource")
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl FsSource {
    /// `extensions` lists the file extensions (without dot) treated as
    /// documents; the first one is the default for extensionless links.
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        let extensions: Vec<String> = if extensions.is_empty() {
            vec![super::policy::DEFAULT_EXTENSION.to_string()]
        } else {
            extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect()
        };
        let cap = NonZeroUsize::new(DEFAULT_PARSE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            root: root.into(),
            links: RwLock::new(LinkTable::new(&extensions[0])),
            extensions,
            cache: RwLock::new(LruCache::new(cap)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an absolute path under the root to a document identity.
    /// Returns `None` for paths outside the root or with other extensions.
    pub fn document_for_path(&self, path: &Path) -> Option<DocumentId> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if !self.has_document_extension(relative) {
            return None;
        }
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(DocumentId::new(parts.join("/")))
    }

    fn has_document_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn path_for(&self, doc: &DocumentId) -> PathBuf {
        doc.as_str()
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    async fn load(&self, doc: &DocumentId) -> anyhow::Result<Arc<ParsedDocument>> {
        let cached = self.cache.read().ok().and_then(|c| c.peek(doc).cloned());
        if let Some(parsed) = cached {
            return Ok(parsed);
        }

        let path = self.path_for(doc);
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let parsed = Arc::new(ParsedDocument::parse(&text));
        log::trace!(
            "Parsed {} ({} bytes, {} links)",
            doc,
            text.len(),
            parsed.links.len()
        );

        if let Ok(mut cache) = self.cache.write() {
            cache.push(doc.clone(), parsed.clone());
        }
        Ok(parsed)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

#[async_trait]
impl DocumentSource for FsSource {
    async fn list_documents(&self) -> anyhow::Result<Vec<DocumentId>> {
        let root = self.root.clone();
        let paths = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !is_hidden(e))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| anyhow!("directory scan task failed: {}", e))?;

        let mut docs: Vec<DocumentId> = paths
            .iter()
            .filter_map(|p| self.document_for_path(p))
            .collect();
        docs.sort();

        let mut links = self
            .links
            .write()
            .map_err(|_| anyhow!("link table lock poisoned"))?;
        links.clear();
        for doc in &docs {
            links.insert(doc.clone());
        }
        log::info!("Found {} documents under {}", docs.len(), self.root.display());
        Ok(docs)
    }

    async fn structured_references(&self, doc: &DocumentId) -> anyhow::Result<Vec<ReferenceRecord>> {
        let parsed = self.load(doc).await?;
        let links = self
            .links
            .read()
            .map_err(|_| anyhow!("link table lock poisoned"))?;
        Ok(parsed
            .links
            .iter()
            .map(|link| {
                let mut record =
                    ReferenceRecord::new(doc.clone(), link.target.clone(), Origin::StructuredLink)
                        .at(link.range.start);
                record.target = links.resolve(&link.target, doc);
                record.subpath = link.subpath.clone();
                record.display = link.display.clone();
                record
            })
            .collect())
    }

    async fn cleaned_text(&self, doc: &DocumentId) -> anyhow::Result<String> {
        Ok(self.load(doc).await?.cleaned.clone())
    }

    async fn metadata(&self, doc: &DocumentId) -> anyhow::Result<DocumentMetadata> {
        Ok(self.load(doc).await?.metadata.clone())
    }

    fn resolve_link(&self, link: &str, from: &DocumentId) -> Option<DocumentId> {
        self.links.read().ok()?.resolve(link, from)
    }

    fn note_change(&self, doc: &DocumentId, exists: bool) {
        if let Ok(mut cache) = self.cache.write() {
            cache.pop(doc);
        }
        if let Ok(mut links) = self.links.write() {
            if exists {
                links.insert(doc.clone());
            } else {
                links.remove(doc);
            }
        }
    }
}
