//
// reference/error.rs
//
// Failure taxonomy for reference indexing. None of these escape the
// document boundary; callers log and continue.
//

use thiserror::Error;

use super::types::DocumentId;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Canonicalization of a single record failed; the record is skipped.
    #[error("cannot generate key for reference {raw_text:?} in {source_doc}: {reason}")]
    KeyGeneration {
        source_doc: DocumentId,
        raw_text: String,
        reason: String,
    },

    /// A pattern detector failed; treated as zero results for the document.
    #[error("detector '{name}' failed on {doc}")]
    Detector {
        name: String,
        doc: DocumentId,
        #[source]
        source: anyhow::Error,
    },

    /// A virtual provider failed; treated as zero results for the document.
    #[error("virtual provider '{name}' failed on {doc}")]
    Provider {
        name: String,
        doc: DocumentId,
        #[source]
        source: anyhow::Error,
    },

    /// The document source could not deliver data for a document.
    #[error("cannot read {doc} from document source")]
    Source {
        doc: DocumentId,
        #[source]
        source: anyhow::Error,
    },
}

impl IndexError {
    pub fn document(&self) -> &DocumentId {
        match self {
            IndexError::KeyGeneration { source_doc, .. } => source_doc,
            IndexError::Detector { doc, .. }
            | IndexError::Provider { doc, .. }
            | IndexError::Source { doc, .. } => doc,
        }
    }

    /// Log a contained failure together with its cause
    pub fn log(&self) {
        match std::error::Error::source(self) {
            Some(cause) => log::warn!("{}: {}", self, cause),
            None => log::warn!("{}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_document() {
        let err = IndexError::Provider {
            name: "frontmatter".to_string(),
            doc: DocumentId::new("a.md"),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "virtual provider 'frontmatter' failed on a.md");
        assert_eq!(err.document().as_str(), "a.md");

        let err = IndexError::KeyGeneration {
            source_doc: DocumentId::new("b.md"),
            raw_text: String::new(),
            reason: "empty target".to_string(),
        };
        assert!(err.to_string().contains("b.md"));
        assert!(err.to_string().contains("empty target"));
    }
}
