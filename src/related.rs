//! Host-facing retrieval service.
//!
//! [`RelatedContent`] wires the vector store, the block locator and the
//! embedding pipeline together behind the two actions a host needs:
//! reindexing a corpus and finding content related to a line of a document.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{RelatedConfig, Settings, StoreConfig};
use crate::corpus::{Corpus, Document};
use crate::embedding::{
    BlockSegmenter, CorpusReport, EmbeddingBackend, EmbeddingPipeline, PipelineOptions,
};
use crate::error::{IndexError, IndexResult};
use crate::identity::content_id;
use crate::locator::BlockLocator;
use crate::store::{VectorStore, read_manifest};
use crate::types::{ContentId, SearchResult};
use crate::vector::centroid;

/// Snapshot of the index for `relata status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub store_name: String,
    pub index_path: PathBuf,
    pub model: String,
    pub dimension: usize,
    pub capacity: usize,
    pub count: usize,
    pub documents: usize,
    pub blocks: usize,
    pub created_at: Option<u64>,
    pub updated_at: Option<u64>,
}

/// Reindex and find-related actions over one index directory.
pub struct RelatedContent {
    index_dir: PathBuf,
    store_config: StoreConfig,
    related: RelatedConfig,
    store: RwLock<VectorStore>,
    locator: RwLock<BlockLocator>,
    pipeline: EmbeddingPipeline,
}

impl std::fmt::Debug for RelatedContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelatedContent")
            .field("index_dir", &self.index_dir)
            .field("store", &*self.store.read())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl RelatedContent {
    /// Opens (or creates) the index described by `settings`.
    ///
    /// Fails when the backend's dimension differs from `store.dimension`, or
    /// when the persisted store was built with another dimension.
    pub fn open(
        settings: &Settings,
        backend: Arc<dyn EmbeddingBackend>,
        segmenter: Arc<dyn BlockSegmenter>,
    ) -> IndexResult<Self> {
        let store_config = settings.store.clone();
        if backend.dimension() != store_config.dimension {
            return Err(IndexError::ModelMismatch {
                backend: backend.dimension(),
                store: store_config.dimension,
            });
        }

        let index_dir = settings.resolved_index_path();
        std::fs::create_dir_all(&index_dir).map_err(|source| IndexError::IndexDir {
            path: index_dir.clone(),
            source,
        })?;

        let mut store = VectorStore::new(&index_dir, store_config.options());
        let loaded = store.initialize(
            &store_config.name,
            store_config.dimension,
            store_config.capacity,
        )?;
        let locator = BlockLocator::open(&index_dir);

        info!(
            "{} index at {} ({} vectors, {} documents)",
            if loaded { "Opened" } else { "Created" },
            index_dir.display(),
            store.count()?,
            locator.index().document_count()
        );

        let pipeline = EmbeddingPipeline::new(
            backend,
            segmenter,
            PipelineOptions::from_config(&settings.embedding),
        );

        Ok(Self {
            index_dir,
            store_config,
            related: settings.related.clone(),
            store: RwLock::new(store),
            locator: RwLock::new(locator),
            pipeline,
        })
    }

    /// Embeds `documents` and commits new vectors and block locations.
    pub async fn reindex(&self, documents: Vec<Document>) -> IndexResult<CorpusReport> {
        self.pipeline
            .embed_corpus(documents, &self.store, &self.locator)
            .await
    }

    /// Reindexes a discovered corpus, folding discovery failures into the
    /// report.
    pub async fn reindex_corpus(&self, corpus: Corpus) -> IndexResult<CorpusReport> {
        let Corpus {
            documents,
            failures,
            ..
        } = corpus;
        let unreadable = failures.len();

        let mut report = self.reindex(documents).await?;
        report.documents_total += unreadable;
        report.failures.extend(failures);
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(report)
    }

    /// Content related to the blocks covering `line` of `document_path`,
    /// using the configured limit.
    pub fn find_related(&self, document_path: &str, line: u32) -> IndexResult<Vec<SearchResult>> {
        self.find_related_limited(document_path, line, self.related.limit)
    }

    /// Like [`find_related`](Self::find_related) with an explicit limit.
    ///
    /// The query is the mean of every stored vector covering the line. A line
    /// outside known blocks, or covered only by blocks without vectors, gives
    /// an empty result.
    pub fn find_related_limited(
        &self,
        document_path: &str,
        line: u32,
        limit: usize,
    ) -> IndexResult<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let keys = self.locator.read().keys_at(document_path, line);
        if keys.is_empty() {
            debug!("No block covers {document_path}:{line}");
            return Ok(Vec::new());
        }
        let source_ids: Vec<ContentId> = keys
            .iter()
            .map(|key| content_id(document_path, key))
            .collect();

        let store = self.store.read();
        let mut vectors = Vec::with_capacity(source_ids.len());
        for id in &source_ids {
            if let Some(vector) = store.vector_of(*id)? {
                vectors.push(vector);
            }
        }
        if vectors.is_empty() {
            debug!("Blocks {keys:?} of {document_path} have no stored vectors");
            return Ok(Vec::new());
        }

        let query = centroid(&vectors);
        let exclude = self.related.exclude_source_blocks;
        let k = if exclude { limit + vectors.len() } else { limit };
        let hits = store.search(&query, k)?;

        let threshold = self.related.threshold;
        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| !exclude || !source_ids.contains(&hit.id))
            .filter(|hit| threshold.is_none_or(|min| hit.score.get() >= min))
            .take(limit)
            .collect();

        debug!(
            "{} related results for {document_path}:{line} from {} source blocks",
            results.len(),
            vectors.len()
        );
        Ok(results)
    }

    /// Clears the store and the location index, persisting both.
    pub fn reset(&self) -> IndexResult<()> {
        let mut store = self.store.write();
        store.reset(self.store_config.capacity, self.store_config.dimension)?;

        let mut locator = self.locator.write();
        locator.index_mut().clear();
        locator.save()?;
        Ok(())
    }

    pub fn status(&self) -> IndexResult<IndexStatus> {
        let store = self.store.read();
        let locator = self.locator.read();

        let manifest = match read_manifest(store.artifact_paths()?) {
            Ok(manifest) => manifest,
            Err(reason) => {
                debug!("Manifest unavailable for status: {reason}");
                None
            }
        };

        Ok(IndexStatus {
            store_name: self.store_config.name.clone(),
            index_path: self.index_dir.clone(),
            model: self.pipeline.backend().model_name().to_string(),
            dimension: store.dimension()?,
            capacity: store.capacity()?,
            count: store.count()?,
            documents: locator.index().document_count(),
            blocks: locator.index().block_count(),
            created_at: manifest.as_ref().map(|m| m.created_at),
            updated_at: manifest.as_ref().map(|m| m.updated_at),
        })
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Shared store handle, for callers that need direct access.
    pub fn store(&self) -> &RwLock<VectorStore> {
        &self.store
    }

    pub fn locator(&self) -> &RwLock<BlockLocator> {
        &self.locator
    }
}
