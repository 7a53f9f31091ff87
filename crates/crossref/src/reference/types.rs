//
// reference/types.rs
//
// Core data types shared by the reference index, detectors and providers
//

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identity of a document inside the corpus.
///
/// Stored as a corpus-relative path with `/` separators (e.g. `notes/Alpha.md`).
/// Cloning is cheap; the path is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
    /// Create an identity from a path, normalizing `\` separators and
    /// stripping a leading `./` or `/`.
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref().replace('\\', "/");
        let trimmed = path.trim_start_matches("./").trim_start_matches('/');
        Self(Arc::from(trimmed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, including the extension
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Last path segment without its extension
    pub fn stem(&self) -> &str {
        split_extension(self.file_name()).0
    }

    /// Extension of the last path segment, without the dot
    pub fn extension(&self) -> Option<&str> {
        split_extension(self.file_name()).1
    }

    /// Directory part of the path, `None` for top-level documents
    pub fn parent(&self) -> Option<&str> {
        self.0.rfind('/').map(|idx| &self.0[..idx])
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({:?})", &*self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Split a file name into `(stem, extension)`.
///
/// Dot-files such as `.hidden` have no extension, and a trailing dot does not
/// produce an empty extension.
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            (&file_name[..idx], Some(&file_name[idx + 1..]))
        }
        _ => (file_name, None),
    }
}

/// Where a reference record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// Explicit link parsed by the host
    StructuredLink,
    /// Implicit mention found by a pattern detector
    Detected,
    /// Computed by a virtual provider
    Virtual,
}

/// A single reference from a source document to a (possibly unresolved) target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Link text as written, without the anchor
    pub raw_text: String,
    /// Resolved target document, `None` when it does not exist (yet)
    pub target: Option<DocumentId>,
    /// Document containing the reference
    pub source: DocumentId,
    /// In-document anchor such as a heading name
    pub subpath: Option<String>,
    /// Start offset within the source document
    pub position: usize,
    pub origin: Origin,
    /// Label shown to the user, if different from `raw_text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl ReferenceRecord {
    pub fn new(source: DocumentId, raw_text: impl Into<String>, origin: Origin) -> Self {
        Self {
            raw_text: raw_text.into(),
            target: None,
            source,
            subpath: None,
            position: 0,
            origin,
            display: None,
        }
    }

    pub fn with_target(mut self, target: DocumentId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// True if the anchor is present and non-empty
    pub fn has_subpath(&self) -> bool {
        self.subpath.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Split link text of the form `target#anchor` into its parts.
///
/// An empty anchor (`target#`) is treated as absent.
pub fn split_subpath(link: &str) -> (&str, Option<&str>) {
    match link.split_once('#') {
        Some((target, anchor)) if !anchor.trim().is_empty() => (target, Some(anchor)),
        Some((target, _)) => (target, None),
        None => (link, None),
    }
}

/// A candidate implicit reference found in a document's cleaned text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectedSpan {
    /// Start offset (inclusive) in the cleaned text
    pub start: usize,
    /// End offset (exclusive) in the cleaned text
    pub end: usize,
    /// Matched text as displayed
    pub display: String,
    /// Link text of the target, resolved through the document source
    pub target: String,
}

impl DetectedSpan {
    pub fn new(start: usize, end: usize, display: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            start,
            end,
            display: display.into(),
            target: target.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Half-open interval overlap; spans that only touch do not overlap.
    pub fn overlaps(&self, other: &DetectedSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}
