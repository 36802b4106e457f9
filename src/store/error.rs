use thiserror::Error;

use crate::store::mapping::MappingError;
use crate::vector::VectorError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store is not initialized\nSuggestion: Call initialize() before using the store")]
    NotInitialized,

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error(
        "Failed to persist {artifact}: {message}\nSuggestion: Check disk space and file permissions for the index directory"
    )]
    Persistence { artifact: String, message: String },

    #[error(
        "Persisted store is corrupt: {reason}\nSuggestion: Run 'relata reset' and reindex, or set store.strict_load = false to start from empty maps"
    )]
    CorruptArtifacts { reason: String },

    #[error(
        "Identity conflict for content {id} at label {label}: {source}\nSuggestion: This indicates a bug in the store. Reset the index"
    )]
    IdentityConflict {
        id: u64,
        label: usize,
        #[source]
        source: MappingError,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;
