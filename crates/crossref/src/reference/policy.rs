//
// reference/policy.rs
//
// Canonicalization policies: map a reference record to the key of its
// equivalence class.
//

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::IndexError;
use super::stem::stem_phrase;
use super::types::{split_extension, ReferenceRecord};

/// Extension appended to extensionless link text when none is configured
pub const DEFAULT_EXTENSION: &str = "md";

/// The closed set of canonicalization strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    #[default]
    CaseInsensitive,
    CaseSensitive,
    /// Key includes the source document, so "who linked" is part of identity
    PerSourceFile,
    WordStem,
    #[serde(rename = "basename")]
    BaseName,
    /// Case-insensitive keys, but at most one record per source is counted
    UniqueSource,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::CaseInsensitive,
        PolicyKind::CaseSensitive,
        PolicyKind::PerSourceFile,
        PolicyKind::WordStem,
        PolicyKind::BaseName,
        PolicyKind::UniqueSource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::CaseInsensitive => "case-insensitive",
            PolicyKind::CaseSensitive => "case-sensitive",
            PolicyKind::PerSourceFile => "per-source-file",
            PolicyKind::WordStem => "word-stem",
            PolicyKind::BaseName => "basename",
            PolicyKind::UniqueSource => "unique-source",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let valid: Vec<_> = PolicyKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("Unknown policy '{}'. Valid policies: {}", s, valid.join(", "))
            })
    }
}

/// An active canonicalization policy.
///
/// All variants share one `generate_key`/`count_references`/`filter_references`
/// surface. Only `UniqueSource` overrides counting and filtering; every other
/// variant uses the shared defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPolicy {
    kind: PolicyKind,
    default_extension: String,
}

impl Default for CanonicalPolicy {
    fn default() -> Self {
        Self::new(PolicyKind::default())
    }
}

impl CanonicalPolicy {
    pub fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            default_extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_default_extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        self.default_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    /// Compute the canonical key of a record.
    ///
    /// Fails only when the record carries nothing to key on (no resolved
    /// target and blank link text).
    pub fn generate_key(&self, record: &ReferenceRecord) -> Result<String, IndexError> {
        match self.kind {
            PolicyKind::CaseInsensitive | PolicyKind::UniqueSource => self.path_key(record, true),
            PolicyKind::CaseSensitive => self.path_key(record, false),
            PolicyKind::PerSourceFile => {
                let target = self.path_key(record, true)?;
                Ok(format!("{}:{}", record.source, target))
            }
            PolicyKind::WordStem => {
                let base = base_name(record)?;
                let stem = stem_phrase(base);
                if stem.is_empty() {
                    return Err(key_error(record, "target name has no stemmable words"));
                }
                Ok(with_anchor(stem, record, true))
            }
            PolicyKind::BaseName => {
                let base = base_name(record)?;
                Ok(with_anchor(base.to_lowercase(), record, true))
            }
        }
    }

    /// Number of references a key's records represent
    pub fn count_references(&self, records: &[ReferenceRecord]) -> usize {
        match self.kind {
            PolicyKind::UniqueSource => unique_by_source(records).len(),
            _ => default_count(records),
        }
    }

    /// Records of a key as they should be presented
    pub fn filter_references<'a>(&self, records: &'a [ReferenceRecord]) -> Vec<&'a ReferenceRecord> {
        match self.kind {
            PolicyKind::UniqueSource => unique_by_source(records),
            _ => default_filter(records),
        }
    }

    fn path_key(&self, record: &ReferenceRecord, fold_case: bool) -> Result<String, IndexError> {
        let base = match &record.target {
            Some(target) => target.as_str().to_string(),
            None => self.normalize_raw(record)?,
        };
        let base = if fold_case { base.to_lowercase() } else { base };
        Ok(with_anchor(base, record, fold_case))
    }

    /// Normalize unresolved link text so it can match a target created later
    fn normalize_raw(&self, record: &ReferenceRecord) -> Result<String, IndexError> {
        let text = record
            .raw_text
            .trim()
            .trim_start_matches("./")
            .trim_start_matches('/');
        if text.is_empty() {
            return Err(key_error(record, "empty link text"));
        }

        let file_name = text.rsplit('/').next().unwrap_or(text);
        let needs_extension = split_extension(file_name).1.is_none()
            && !record.has_subpath()
            && !self.default_extension.is_empty();
        if needs_extension {
            Ok(format!("{}.{}", text, self.default_extension))
        } else {
            Ok(text.to_string())
        }
    }
}

fn default_count(records: &[ReferenceRecord]) -> usize {
    records.len()
}

fn default_filter(records: &[ReferenceRecord]) -> Vec<&ReferenceRecord> {
    records.iter().collect()
}

/// First record per distinct source document, order preserved
fn unique_by_source(records: &[ReferenceRecord]) -> Vec<&ReferenceRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert(&r.source))
        .collect()
}

/// Target's file name with directory and extension stripped
fn base_name(record: &ReferenceRecord) -> Result<&str, IndexError> {
    let name = match &record.target {
        Some(target) => target.stem(),
        None => {
            let text = record.raw_text.trim();
            let file_name = text.rsplit('/').next().unwrap_or(text);
            split_extension(file_name).0
        }
    };
    if name.trim().is_empty() {
        return Err(key_error(record, "empty target name"));
    }
    Ok(name.trim())
}

fn with_anchor(mut key: String, record: &ReferenceRecord, fold_case: bool) -> String {
    if let Some(subpath) = record.subpath.as_deref().filter(|s| !s.is_empty()) {
        key.push('#');
        if fold_case {
            key.push_str(&subpath.to_lowercase());
        } else {
            key.push_str(subpath);
        }
    }
    key
}

fn key_error(record: &ReferenceRecord, reason: &str) -> IndexError {
    IndexError::KeyGeneration {
        source_doc: record.source.clone(),
        raw_text: record.raw_text.clone(),
        reason: reason.to_string(),
    }
}
