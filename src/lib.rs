//! Semantic retrieval of markdown blocks.
//!
//! Documents are split into keyed blocks, embedded, and stored in a
//! persistent HNSW index. Related content for a line of a document is found
//! by averaging the vectors of the blocks covering that line and searching
//! the index with the result.

pub mod config;
pub mod corpus;
pub mod display;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod locator;
pub mod logging;
pub mod related;
pub mod store;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use corpus::{Corpus, Document};
pub use embedding::{
    BlockSegmenter, CorpusReport, EmbeddingBackend, EmbeddingPipeline, FastEmbedBackend,
    MarkdownSegmenter,
};
pub use error::{ErrorContext, IndexError, IndexResult};
pub use identity::content_id;
pub use locator::{BlockLocationIndex, BlockLocator};
pub use related::{IndexStatus, RelatedContent};
pub use store::{StoreError, StoreOptions, VectorStore};
pub use types::{Block, BlockMetadata, BlockSpan, ContentId, Label, SearchResult, VectorRecord};
pub use vector::{Score, VectorError, centroid};
