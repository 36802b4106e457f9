//! Turning documents into vector records.
//!
//! Segmentation, block identity and backend calls come together in
//! [`EmbeddingPipeline`]. The backend and the segmenter are traits so the
//! pipeline can be driven by any model and any block format.

mod backend;
mod pipeline;
mod segmenter;

use std::time::Duration;

use thiserror::Error;

use crate::vector::VectorError;

pub use backend::{
    Embedding, EmbeddingBackend, FastEmbedBackend, estimate_tokens, parse_embedding_model,
};
pub use pipeline::{
    CorpusEmbedding, CorpusReport, DocumentEmbedding, DocumentFailure, EmbeddingPipeline,
    PipelineOptions,
};
pub use segmenter::{BlockSegmenter, MarkdownSegmenter, PREAMBLE_KEY};

/// Errors from embedding backends and the pipeline.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Check embedding.model in settings and your internet connection for the first download"
    )]
    ModelInit(String),

    #[error("Embedding backend failed: {0}")]
    Backend(String),

    #[error(
        "Embedding call timed out after {after:?}\nSuggestion: Raise embedding.timeout_ms or lower embedding.workers"
    )]
    Timeout { after: Duration },

    #[error("Embedding backend returned no vector")]
    EmptyEmbedding,

    #[error(transparent)]
    Dimension(#[from] VectorError),
}
