//! Error types for the retrieval system
//!
//! Each subsystem has its own thiserror enum. [`IndexError`] is the
//! top-level type the facade and the CLI work with.

use std::path::PathBuf;

use thiserror::Error;

use crate::corpus::CorpusError;
use crate::embedding::EmbeddingError;
use crate::locator::LocatorError;
use crate::store::StoreError;
use crate::vector::VectorError;

/// Main error type for indexing and lookup operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create index directory '{path}': {source}")]
    IndexDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error(
        "Embedding model produces {backend} dimensions but the store holds {store}\nSuggestion: Use the model the index was built with, or run 'relata reset'"
    )]
    ModelMismatch { backend: usize, store: usize },

    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Store(StoreError::NotInitialized) => "STORE_NOT_INITIALIZED",
            Self::Store(StoreError::CorruptArtifacts { .. }) => "INDEX_CORRUPTED",
            Self::Store(_) => "STORE_ERROR",
            Self::Embedding(EmbeddingError::Timeout { .. }) => "EMBEDDING_TIMEOUT",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Locator(_) => "LOCATOR_ERROR",
            Self::Vector(VectorError::DimensionMismatch { .. }) => "DIMENSION_MISMATCH",
            Self::Vector(_) => "VECTOR_ERROR",
            Self::Corpus(_) => "CORPUS_ERROR",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::IndexDir { .. } => "INDEX_DIR_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::ModelMismatch { .. } => "MODEL_MISMATCH",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Store(StoreError::CorruptArtifacts { .. }) => vec![
                "Run 'relata reset' and reindex to rebuild from scratch",
                "Check for disk errors or filesystem corruption",
            ],
            Self::Store(StoreError::NotInitialized) => vec![
                "Open the index before adding or searching",
            ],
            Self::Store(_) | Self::Locator(_) | Self::IndexDir { .. } => vec![
                "Check disk space and permissions in the index directory",
                "Run 'relata reset' if you continue to have issues",
            ],
            Self::Embedding(EmbeddingError::Timeout { .. }) => vec![
                "Raise embedding.timeout_ms in .relata/settings.toml",
                "Lower embedding.workers to reduce contention",
            ],
            Self::Vector(VectorError::DimensionMismatch { .. }) | Self::ModelMismatch { .. } => {
                vec![
                    "Keep store.dimension in line with the embedding model",
                    "Run 'relata reset' after switching models",
                ]
            }
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, IndexError>;

    /// Add context with a path
    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| {
            IndexError::General(format!("Error processing '{}': {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_specific() {
        let err = IndexError::from(StoreError::NotInitialized);
        assert_eq!(err.status_code(), "STORE_NOT_INITIALIZED");

        let err = IndexError::from(VectorError::DimensionMismatch {
            expected: 4,
            actual: 3,
        });
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_context_wraps_message() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::other("boom"));
        let err = result.context("loading settings").unwrap_err();
        assert_eq!(err.to_string(), "loading settings: boom");
    }
}
