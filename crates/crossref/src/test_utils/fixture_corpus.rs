//! Deterministic fixture corpus generator for benchmarks and tests.
//!
//! Generates synthetic markdown vaults with controlled characteristics:
//! document count, folder spread, wikilinks per document, plain-text title
//! mentions, front matter relations and filler lines.
//!
//! All output is deterministic (no randomness) so benchmarks are reproducible.

use std::fmt::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Configuration for generating a fixture corpus.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub document_count: usize,
    /// Documents are spread round-robin over this many folders (0 = root only)
    pub folders: usize,
    pub links_per_document: usize,
    /// Plain-text mentions of other documents' titles
    pub mentions_per_document: usize,
    /// Entries in the `related` front matter list
    pub related_per_document: usize,
    pub filler_lines_per_document: usize,
}

impl FixtureConfig {
    /// Small corpus: 10 documents, 3 links each.
    pub fn small() -> Self {
        Self {
            document_count: 10,
            folders: 2,
            links_per_document: 3,
            mentions_per_document: 1,
            related_per_document: 1,
            filler_lines_per_document: 5,
        }
    }

    /// Medium corpus: 100 documents, 8 links each.
    pub fn medium() -> Self {
        Self {
            document_count: 100,
            folders: 5,
            links_per_document: 8,
            mentions_per_document: 3,
            related_per_document: 2,
            filler_lines_per_document: 20,
        }
    }

    /// Large corpus: 500 documents, 15 links each.
    pub fn large() -> Self {
        Self {
            document_count: 500,
            folders: 10,
            links_per_document: 15,
            mentions_per_document: 5,
            related_per_document: 3,
            filler_lines_per_document: 50,
        }
    }
}

/// Title (file stem) of document `index`
pub fn fixture_title(index: usize) -> String {
    format!("Topic {}", index)
}

/// Path of document `index`, relative to the corpus root
pub fn fixture_path(index: usize, config: &FixtureConfig) -> PathBuf {
    let file = format!("{}.md", fixture_title(index));
    if config.folders == 0 {
        PathBuf::from(file)
    } else {
        PathBuf::from(format!("area_{}", index % config.folders)).join(file)
    }
}

/// Generate the content of a single document deterministically.
///
/// Link `k` of document `i` points at document `(i + k + 1) % n`; every
/// second link carries a `#Section` anchor.
fn generate_document(index: usize, config: &FixtureConfig) -> String {
    let n = config.document_count.max(1);
    let mut content = String::new();

    if config.related_per_document > 0 {
        content.push_str("---\nrelated:\n");
        for r in 0..config.related_per_document {
            let _ = writeln!(content, "  - \"[[{}]]\"", fixture_title((index + 2 * r + 3) % n));
        }
        content.push_str("---\n");
    }

    let _ = writeln!(content, "# {}\n", fixture_title(index));

    for k in 0..config.links_per_document {
        let target = fixture_title((index + k + 1) % n);
        if k % 2 == 1 {
            let _ = writeln!(content, "- see [[{}#Section]]", target);
        } else {
            let _ = writeln!(content, "- see [[{}]]", target);
        }
    }
    content.push('\n');

    for m in 0..config.mentions_per_document {
        let _ = writeln!(
            content,
            "This paragraph talks about {} in passing.",
            fixture_title((index + 5 * m + 7) % n)
        );
    }

    content.push_str("\n```\n[[Not A Link]] inside code\n```\n\n");

    for line in 0..config.filler_lines_per_document {
        let _ = writeln!(content, "Filler line {} of document {}.", line, index);
    }

    content
}

/// Create a temporary fixture corpus from the given configuration.
///
/// The directory is cleaned up when the `TempDir` is dropped. Calling this
/// twice with the same `FixtureConfig` produces byte-identical files.
pub fn create_fixture_corpus(config: &FixtureConfig) -> std::io::Result<TempDir> {
    let temp_dir = TempDir::new()?;
    write_fixture_corpus(temp_dir.path(), config)?;
    Ok(temp_dir)
}

/// Write fixture documents into an existing directory.
pub fn write_fixture_corpus(dir: &Path, config: &FixtureConfig) -> std::io::Result<()> {
    for i in 0..config.document_count {
        let path = dir.join(fixture_path(i, config));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, generate_document(i, config))?;
    }
    Ok(())
}
