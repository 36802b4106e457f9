//! Core identity and record types shared by the pipeline and the vector store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::vector::Score;

/// Stable identity of a block, derived by hashing `document_path + block_key`.
///
/// Deterministic across runs and machines, so the same logical block always
/// lands on the same store entry. See [`crate::identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl ContentId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense identity assigned by the ANN graph at insertion time.
///
/// Labels are positions in the graph (0, 1, 2, ...) and are never reused
/// until the store is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub usize);

impl Label {
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive, 1-indexed line span of a block within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    pub start: u32,
    pub end: u32,
}

impl BlockSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Both bounds are inclusive.
    pub fn contains(&self, line: u32) -> bool {
        line >= self.start && line <= self.end
    }

    pub fn line_count(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }
}

/// A named span of source lines, the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub key: String,
    pub span: BlockSpan,
}

impl Block {
    pub fn new(key: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            key: key.into(),
            span: BlockSpan::new(start, end),
        }
    }
}

/// Display metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub key: String,
    pub text: String,
    pub document_path: String,
}

/// A vector together with the identity and metadata of the block it embeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: ContentId,
    pub vector: Vec<f32>,
    pub metadata: BlockMetadata,
}

/// One ranked hit returned by a store search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: ContentId,
    pub score: Score,
    pub metadata: BlockMetadata,
}
