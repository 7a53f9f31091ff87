//
// reference/index.rs
//
// The reference index: canonical key -> records, plus per-document reverse
// mappings for incremental maintenance
//

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use super::policy::{CanonicalPolicy, PolicyKind};
use super::types::{split_extension, DocumentId, ReferenceRecord};

/// Result of applying one document's records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Records removed from the previous contribution
    pub removed: usize,
    pub inserted: usize,
    /// Records skipped because no key could be generated
    pub skipped: usize,
}

/// Mapping from canonical key to the records that resolve to it.
///
/// Records of one key keep insertion order. Every mutation replaces a whole
/// document's contribution, so a reader never sees half of a document.
#[derive(Debug)]
pub struct ReferenceIndex {
    policy: CanonicalPolicy,
    /// Forward lookup: key -> records in insertion order
    forward: IndexMap<String, Vec<ReferenceRecord>>,
    /// Reverse lookup: source document -> keys it contributes to
    by_source: HashMap<DocumentId, IndexSet<String>>,
    /// Resolved target -> keys holding at least one record pointing at it
    by_target: HashMap<DocumentId, IndexSet<String>>,
    /// Lowercased file stem of unresolved link text -> keys holding such
    /// records, so a document created later finds references written before it
    unresolved: HashMap<String, IndexSet<String>>,
    /// Bumped on every mutation
    version: u64,
}

impl Default for ReferenceIndex {
    fn default() -> Self {
        Self::new(CanonicalPolicy::default())
    }
}

impl ReferenceIndex {
    pub fn new(policy: CanonicalPolicy) -> Self {
        Self {
            policy,
            forward: IndexMap::new(),
            by_source: HashMap::new(),
            by_target: HashMap::new(),
            unresolved: HashMap::new(),
            version: 0,
        }
    }

    pub fn policy(&self) -> &CanonicalPolicy {
        &self.policy
    }

    /// Replace the active policy. Existing keys were produced by the old
    /// policy, so the index is cleared; callers must rebuild.
    pub fn set_policy(&mut self, policy: CanonicalPolicy) {
        log::info!("Switching canonicalization policy: {} -> {}", self.policy.kind(), policy.kind());
        self.policy = policy;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.by_source.clear();
        self.by_target.clear();
        self.unresolved.clear();
        self.version += 1;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace everything `doc` contributes with `records`.
    ///
    /// Records whose key cannot be generated are skipped and logged. Records
    /// claiming a different source document are rejected.
    pub fn replace_document(&mut self, doc: &DocumentId, records: Vec<ReferenceRecord>) -> ApplyReport {
        let mut report = ApplyReport {
            removed: self.purge(doc),
            ..Default::default()
        };

        for record in records {
            if &record.source != doc {
                log::warn!(
                    "Skipping reference {:?} attributed to {} while indexing {}",
                    record.raw_text,
                    record.source,
                    doc
                );
                report.skipped += 1;
                continue;
            }
            let key = match self.policy.generate_key(&record) {
                Ok(key) => key,
                Err(e) => {
                    e.log();
                    report.skipped += 1;
                    continue;
                }
            };
            self.insert(key, record);
            report.inserted += 1;
        }

        self.version += 1;
        log::trace!(
            "Indexed {}: removed {}, inserted {}, skipped {}",
            doc,
            report.removed,
            report.inserted,
            report.skipped
        );
        report
    }

    /// Remove everything `doc` contributes. Returns the number of records removed.
    pub fn remove_document(&mut self, doc: &DocumentId) -> usize {
        let removed = self.purge(doc);
        self.version += 1;
        removed
    }

    fn insert(&mut self, key: String, record: ReferenceRecord) {
        self.by_source
            .entry(record.source.clone())
            .or_default()
            .insert(key.clone());
        match &record.target {
            Some(target) => {
                self.by_target
                    .entry(target.clone())
                    .or_default()
                    .insert(key.clone());
            }
            None => {
                if let Some(stem) = unresolved_stem(&record.raw_text) {
                    self.unresolved.entry(stem).or_default().insert(key.clone());
                }
            }
        }
        self.forward.entry(key).or_default().push(record);
    }

    /// Drop all records of `doc` using the reverse mapping
    fn purge(&mut self, doc: &DocumentId) -> usize {
        let Some(keys) = self.by_source.remove(doc) else {
            return 0;
        };

        let mut removed = 0;
        for key in keys {
            let Some(records) = self.forward.get_mut(&key) else {
                continue;
            };
            let mut dropped_targets: IndexSet<DocumentId> = IndexSet::new();
            let mut dropped_stems: IndexSet<String> = IndexSet::new();
            let before = records.len();
            records.retain(|r| {
                if &r.source != doc {
                    return true;
                }
                match &r.target {
                    Some(t) => {
                        dropped_targets.insert(t.clone());
                    }
                    None => dropped_stems.extend(unresolved_stem(&r.raw_text)),
                }
                false
            });
            removed += before - records.len();

            for target in dropped_targets {
                if records.iter().any(|r| r.target.as_ref() == Some(&target)) {
                    continue;
                }
                if let Some(keys) = self.by_target.get_mut(&target) {
                    keys.shift_remove(&key);
                    if keys.is_empty() {
                        self.by_target.remove(&target);
                    }
                }
            }

            for stem in dropped_stems {
                let still_waiting = records.iter().any(|r| {
                    r.target.is_none() && unresolved_stem(&r.raw_text).as_deref() == Some(stem.as_str())
                });
                if still_waiting {
                    continue;
                }
                if let Some(keys) = self.unresolved.get_mut(&stem) {
                    keys.shift_remove(&key);
                    if keys.is_empty() {
                        self.unresolved.remove(&stem);
                    }
                }
            }

            if records.is_empty() {
                self.forward.swap_remove(&key);
            }
        }
        removed
    }

    /// Policy-filtered records of a key, in insertion order
    pub fn query(&self, key: &str) -> Vec<&ReferenceRecord> {
        self.forward
            .get(key)
            .map(|records| self.policy.filter_references(records))
            .unwrap_or_default()
    }

    /// Policy-counted number of references for a key
    pub fn count(&self, key: &str) -> usize {
        self.forward
            .get(key)
            .map(|records| self.policy.count_references(records))
            .unwrap_or(0)
    }

    /// Unfiltered records of a key
    pub fn records(&self, key: &str) -> &[ReferenceRecord] {
        self.forward.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.forward.contains_key(key)
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.forward.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn key_count(&self) -> usize {
        self.forward.len()
    }

    /// Total raw records, regardless of policy counting
    pub fn record_count(&self) -> usize {
        self.forward.values().map(Vec::len).sum()
    }

    pub fn document_count(&self) -> usize {
        self.by_source.len()
    }

    pub fn contains_document(&self, doc: &DocumentId) -> bool {
        self.by_source.contains_key(doc)
    }

    /// Keys `doc` currently contributes to, in contribution order
    pub fn keys_for_source(&self, doc: &DocumentId) -> Vec<&str> {
        self.by_source
            .get(doc)
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Records whose source is `doc`, ordered by position
    pub fn outgoing(&self, doc: &DocumentId) -> Vec<&ReferenceRecord> {
        let mut records: Vec<&ReferenceRecord> = self
            .keys_for_source(doc)
            .into_iter()
            .flat_map(|key| self.records(key))
            .filter(|r| &r.source == doc)
            .collect();
        records.sort_by_key(|r| r.position);
        records
    }

    /// Keys that refer to `target`, sorted. These are keys holding records
    /// resolved to it, keys holding unresolved links that name it (with or
    /// without folders, extension or anchor), and the key the target itself
    /// canonicalizes to.
    pub fn keys_for_target(&self, target: &DocumentId) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .by_target
            .get(target)
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default();

        if let Some(waiting) = self.unresolved.get(&target.stem().to_lowercase()) {
            keys.extend(
                waiting
                    .iter()
                    .filter(|key| {
                        self.records(key)
                            .iter()
                            .any(|r| r.target.is_none() && link_names_target(&r.raw_text, target))
                    })
                    .map(String::as_str),
            );
        }

        if self.policy.kind() != PolicyKind::PerSourceFile {
            let own_link = ReferenceRecord::new(
                target.clone(),
                target.as_str(),
                super::types::Origin::StructuredLink,
            )
            .with_target(target.clone());
            if let Ok(own_key) = self.policy.generate_key(&own_link) {
                if let Some((key, _)) = self.forward.get_key_value(own_key.as_str()) {
                    keys.push(key.as_str());
                }
            }
        }

        keys.sort_unstable();
        keys.dedup();
        keys
    }

    /// Policy-filtered records from other documents, grouped by the keys
    /// that refer to `target`. Keys with nothing left after filtering are
    /// omitted.
    pub fn incoming_for_target(&self, target: &DocumentId) -> IndexMap<String, Vec<&ReferenceRecord>> {
        self.keys_for_target(target)
            .into_iter()
            .filter_map(|key| {
                let records: Vec<&ReferenceRecord> = self
                    .query(key)
                    .into_iter()
                    .filter(|r| &r.source != target)
                    .collect();
                (!records.is_empty()).then(|| (key.to_string(), records))
            })
            .collect()
    }

    /// Sorted `(key, records)` pairs, for comparisons and debugging
    pub fn entries(&self) -> Vec<(&str, &[ReferenceRecord])> {
        let mut entries: Vec<(&str, &[ReferenceRecord])> = self
            .forward
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
            .collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Human-readable dump of the index for debugging
    pub fn dump_state(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Reference Index State (policy {}, version {}, {} keys, {} records, {} documents):\n",
            self.policy.kind(),
            self.version,
            self.key_count(),
            self.record_count(),
            self.document_count()
        ));
        if self.forward.is_empty() {
            output.push_str("  (empty)\n");
            return output;
        }
        for (key, records) in self.entries() {
            output.push_str(&format!("  {} (count {}):\n", key, self.policy.count_references(records)));
            for r in records {
                let target = r.target.as_ref().map(|t| t.as_str()).unwrap_or("<unresolved>");
                output.push_str(&format!(
                    "    {}@{} -> {} [{:?}]\n",
                    r.source, r.position, target, r.origin
                ));
            }
        }
        output
    }
}

/// Lowercased file stem of link text: folders, extension and surrounding
/// whitespace removed
fn unresolved_stem(raw: &str) -> Option<String> {
    let text = raw.trim().trim_end_matches('/');
    let file_name = text.rsplit('/').next().unwrap_or(text);
    let stem = split_extension(file_name).0.trim();
    (!stem.is_empty()).then(|| stem.to_lowercase())
}

/// Whether link text could name `target`: ignoring case, it equals the
/// target's path or a trailing run of its folders, with or without extension
fn link_names_target(raw: &str, target: &DocumentId) -> bool {
    let link = raw.trim().replace('\\', "/").to_lowercase();
    let link = link.trim_start_matches("./").trim_start_matches('/');
    if link.is_empty() {
        return false;
    }

    let full = target.as_str().to_lowercase();
    let bare = target
        .extension()
        .and_then(|ext| target.as_str().strip_suffix(ext))
        .and_then(|rest| rest.strip_suffix('.'))
        .map(str::to_lowercase);
    let nested = format!("/{}", link);
    std::iter::once(full)
        .chain(bare)
        .any(|path| path == link || path.ends_with(&nested))
}
