//
// reference/config.rs
//
// Configuration for the reference index
//

use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::policy::{CanonicalPolicy, PolicyKind, DEFAULT_EXTENSION};

/// Reference index configuration.
///
/// Deserializes from camelCase JSON; absent fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexConfig {
    /// Active canonicalization policy
    pub policy: PolicyKind,
    /// Extension appended to extensionless link text
    pub default_extension: String,
    /// File extensions treated as documents by the file-system source
    pub extensions: Vec<String>,
    /// Documents processed between yields (and stop checks) during a rebuild
    pub rebuild_chunk_size: usize,
    /// Whether the title detector runs
    pub detect_titles: bool,
    /// Titles shorter than this many characters are not detected
    pub min_title_length: usize,
    /// Whether the term detector runs (requires `terms`)
    pub detect_terms: bool,
    /// Term phrase -> target link text
    pub terms: IndexMap<String, String>,
    /// Front matter keys turned into virtual references
    pub frontmatter_keys: Vec<String>,
    /// Maximum number of cached document views
    pub view_cache_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::CaseInsensitive,
            default_extension: DEFAULT_EXTENSION.to_string(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            rebuild_chunk_size: 64,
            detect_titles: true,
            min_title_length: 3,
            detect_terms: true,
            terms: IndexMap::new(),
            frontmatter_keys: vec!["related".to_string(), "parent".to_string()],
            view_cache_capacity: 128,
        }
    }
}

impl IndexConfig {
    /// Parse configuration from JSON settings.
    ///
    /// Accepts either the config object itself or settings wrapping it in a
    /// top-level `references` section.
    pub fn from_json(settings: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let section = settings.get("references").unwrap_or(settings);
        let config: IndexConfig = serde_json::from_value(section.clone())?;
        config.log_summary();
        Ok(config.normalized())
    }

    /// Read JSON configuration from a file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Self::from_json(&value).with_context(|| format!("invalid config {}", path.display()))
    }

    /// The policy these settings select
    pub fn canonical_policy(&self) -> CanonicalPolicy {
        CanonicalPolicy::new(self.policy).with_default_extension(self.default_extension.clone())
    }

    /// Check if settings that change already-indexed content differ.
    /// Changing any of these requires a full rebuild.
    pub fn rebuild_required(&self, other: &Self) -> bool {
        self.policy != other.policy
            || self.default_extension != other.default_extension
            || self.extensions != other.extensions
            || self.detect_titles != other.detect_titles
            || self.min_title_length != other.min_title_length
            || self.detect_terms != other.detect_terms
            || self.terms != other.terms
            || self.frontmatter_keys != other.frontmatter_keys
    }

    fn normalized(mut self) -> Self {
        self.default_extension = self.default_extension.trim_start_matches('.').to_string();
        if self.default_extension.is_empty() {
            self.default_extension = DEFAULT_EXTENSION.to_string();
        }
        if self.extensions.is_empty() {
            self.extensions = vec![self.default_extension.clone()];
        }
        self.rebuild_chunk_size = self.rebuild_chunk_size.max(1);
        self.view_cache_capacity = self.view_cache_capacity.max(1);
        self
    }

    fn log_summary(&self) {
        log::info!("Reference index configuration loaded:");
        log::info!("  policy: {}", self.policy);
        log::info!("  default_extension: {}", self.default_extension);
        log::info!("  extensions: {:?}", self.extensions);
        log::info!("  rebuild_chunk_size: {}", self.rebuild_chunk_size);
        log::info!(
            "  detectors: titles={} (min {}), terms={} ({} entries)",
            self.detect_titles,
            self.min_title_length,
            self.detect_terms,
            self.terms.len()
        );
        log::info!("  frontmatter_keys: {:?}", self.frontmatter_keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_values() {
        let config = IndexConfig::default();
        assert_eq!(config.policy, PolicyKind::CaseInsensitive);
        assert_eq!(config.default_extension, "md");
        assert_eq!(config.extensions, vec!["md"]);
        assert_eq!(config.rebuild_chunk_size, 64);
        assert!(config.detect_titles);
        assert!(config.terms.is_empty());
        assert_eq!(config.frontmatter_keys, vec!["related", "parent"]);
    }

    #[test]
    fn test_from_json_partial() {
        let settings = json!({
            "references": {
                "policy": "unique-source",
                "rebuildChunkSize": 0,
                "terms": { "borrow checker": "Borrowing" },
                "defaultExtension": ".markdown"
            }
        });
        let config = IndexConfig::from_json(&settings).unwrap();
        assert_eq!(config.policy, PolicyKind::UniqueSource);
        assert_eq!(config.rebuild_chunk_size, 1);
        assert_eq!(config.terms["borrow checker"], "Borrowing");
        assert_eq!(config.default_extension, "markdown");
        // Untouched fields keep defaults
        assert!(config.detect_titles);
        assert_eq!(config.view_cache_capacity, 128);
    }

    #[test]
    fn test_from_json_unwrapped_section() {
        let config = IndexConfig::from_json(&json!({ "policy": "basename" })).unwrap();
        assert_eq!(config.policy, PolicyKind::BaseName);
    }

    #[test]
    fn test_from_json_rejects_unknown_policy() {
        assert!(IndexConfig::from_json(&json!({ "policy": "fuzzy" })).is_err());
    }

    #[test]
    fn test_rebuild_required() {
        let config1 = IndexConfig::default();
        let mut config2 = IndexConfig::default();
        assert!(!config1.rebuild_required(&config2));

        config2.policy = PolicyKind::WordStem;
        assert!(config1.rebuild_required(&config2));

        config2 = IndexConfig::default();
        config2.frontmatter_keys.push("see-also".to_string());
        assert!(config1.rebuild_required(&config2));
    }

    #[test]
    fn test_non_content_settings_do_not_require_rebuild() {
        let config1 = IndexConfig::default();
        let mut config2 = IndexConfig::default();
        config2.rebuild_chunk_size = 8;
        config2.view_cache_capacity = 4;
        assert!(!config1.rebuild_required(&config2));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crossref.json");
        std::fs::write(&path, r#"{ "policy": "word-stem", "detectTitles": false }"#).unwrap();
        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.policy, PolicyKind::WordStem);
        assert!(!config.detect_titles);

        assert!(IndexConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
