//
// reference/view.rs
//
// Per-document view over the index: what a document refers to and what
// refers to it
//

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use lru::LruCache;
use serde::Serialize;

use super::index::ReferenceIndex;
use super::types::{DocumentId, ReferenceRecord};

/// Outgoing and incoming references of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    pub document: DocumentId,
    /// Records whose source is the document, by position
    pub outgoing: Vec<ReferenceRecord>,
    /// Policy-filtered records from other documents, per key
    pub incoming_by_key: IndexMap<String, Vec<ReferenceRecord>>,
}

impl DocumentView {
    pub fn build(index: &ReferenceIndex, doc: &DocumentId) -> Self {
        Self {
            document: doc.clone(),
            outgoing: index.outgoing(doc).into_iter().cloned().collect(),
            incoming_by_key: index
                .incoming_for_target(doc)
                .into_iter()
                .map(|(key, records)| (key, records.into_iter().cloned().collect()))
                .collect(),
        }
    }

    pub fn incoming_count(&self) -> usize {
        self.incoming_by_key.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming_by_key.is_empty()
    }
}

/// LRU cache of document views, valid for one index version
#[derive(Debug)]
pub struct ViewCache {
    inner: Mutex<LruCache<DocumentId, (u64, Arc<DocumentView>)>>,
}

impl ViewCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Return the cached view of `doc` if it was built at `version`,
    /// otherwise build and cache it with `build`.
    pub fn get_or_build(
        &self,
        doc: &DocumentId,
        version: u64,
        build: impl FnOnce() -> DocumentView,
    ) -> Arc<DocumentView> {
        if let Ok(mut cache) = self.inner.lock() {
            if let Some((cached_version, view)) = cache.get(doc) {
                if *cached_version == version {
                    return view.clone();
                }
            }
        }

        let view = Arc::new(build());
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(doc.clone(), (version, view.clone()));
        }
        view
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
