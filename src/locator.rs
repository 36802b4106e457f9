//! Line-to-block lookup.
//!
//! The pipeline records every block it segments, including blocks too empty
//! to embed, in a [`BlockLocationIndex`]. [`BlockLocator`] persists that index
//! next to the vector store and answers "which blocks cover line N of this
//! document".

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Block, BlockSpan};

/// File name of the persisted location index inside the index directory.
pub const LOCATIONS_FILE: &str = "block_locations.json";

#[derive(Error, Debug)]
pub enum LocatorError {
    #[error("Failed to access block locations at {path}: {source}\nSuggestion: Check file permissions for the index directory")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Block locations at {path} are unreadable: {source}\nSuggestion: Reindex the corpus to rebuild them")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// `document path -> (block key -> [start, end])`, inclusive 1-indexed spans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockLocationIndex {
    documents: BTreeMap<String, BTreeMap<String, [u32; 2]>>,
}

impl BlockLocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything known about `document_path` with `blocks`.
    pub fn insert_document(&mut self, document_path: &str, blocks: &[Block]) {
        let spans = blocks
            .iter()
            .map(|block| (block.key.clone(), [block.span.start, block.span.end]))
            .collect();
        self.documents.insert(document_path.to_string(), spans);
    }

    pub fn remove_document(&mut self, document_path: &str) -> bool {
        self.documents.remove(document_path).is_some()
    }

    /// Takes over every document of `other`, replacing existing entries.
    pub fn merge(&mut self, other: BlockLocationIndex) {
        self.documents.extend(other.documents);
    }

    /// Keys of every block in `document_path` whose span contains `line`.
    ///
    /// Both bounds are inclusive. Results are ordered by span start, then key.
    pub fn keys_at(&self, document_path: &str, line: u32) -> Vec<String> {
        let Some(blocks) = self.documents.get(document_path) else {
            return Vec::new();
        };

        let mut hits: Vec<(u32, &String)> = blocks
            .iter()
            .filter(|(_, [start, end])| BlockSpan::new(*start, *end).contains(line))
            .map(|(key, [start, _])| (*start, key))
            .collect();
        hits.sort();
        hits.into_iter().map(|(_, key)| key.clone()).collect()
    }

    pub fn span_of(&self, document_path: &str, block_key: &str) -> Option<BlockSpan> {
        self.documents
            .get(document_path)?
            .get(block_key)
            .map(|[start, end]| BlockSpan::new(*start, *end))
    }

    pub fn contains_document(&self, document_path: &str) -> bool {
        self.documents.contains_key(document_path)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn block_count(&self) -> usize {
        self.documents.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn clear(&mut self) {
        self.documents.clear();
    }
}

/// Persisted [`BlockLocationIndex`].
#[derive(Debug)]
pub struct BlockLocator {
    path: PathBuf,
    index: BlockLocationIndex,
}

impl BlockLocator {
    /// Opens the index stored in `index_dir`.
    ///
    /// A missing file yields an empty index. An unreadable one is logged and
    /// replaced by an empty index, since a reindex rebuilds it.
    pub fn open(index_dir: &Path) -> Self {
        let path = index_dir.join(LOCATIONS_FILE);
        let index = match Self::read(&path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Starting with empty block locations: {e}");
                BlockLocationIndex::new()
            }
        };
        debug!(
            "Opened block locations at {} ({} documents)",
            path.display(),
            index.document_count()
        );
        Self { path, index }
    }

    fn read(path: &Path) -> Result<BlockLocationIndex, LocatorError> {
        if !path.exists() {
            return Ok(BlockLocationIndex::new());
        }
        let bytes = fs::read(path).map_err(|source| LocatorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| LocatorError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the index through a temporary file and a rename.
    pub fn save(&self) -> Result<(), LocatorError> {
        let io_error = |source| LocatorError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let json = serde_json::to_vec_pretty(&self.index).map_err(|source| LocatorError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(io_error)?;
        fs::rename(&temp_path, &self.path).map_err(io_error)
    }

    /// Keys of the blocks covering `line` in `document_path`.
    pub fn keys_at(&self, document_path: &str, line: u32) -> Vec<String> {
        self.index.keys_at(document_path, line)
    }

    pub fn index(&self) -> &BlockLocationIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut BlockLocationIndex {
        &mut self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
