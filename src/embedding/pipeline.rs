//! Document and corpus embedding.
//!
//! A document is segmented, each block is sliced out of the text and
//! trimmed, and every non-empty block is sent to the backend. Blocks that trim
//! to nothing produce no record but still appear in the location index.
//!
//! Across a corpus, documents are embedded concurrently by at most
//! `workers` tasks. Each backend call runs on the blocking pool under a
//! timeout. Any failure inside a document fails that document only; the rest
//! of the corpus carries on and the failure is reported.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::corpus::Document;
use crate::embedding::{BlockSegmenter, Embedding, EmbeddingBackend, EmbeddingError};
use crate::error::IndexResult;
use crate::identity::content_id;
use crate::locator::{BlockLocationIndex, BlockLocator};
use crate::store::VectorStore;
use crate::types::{Block, BlockMetadata, BlockSpan, VectorRecord};
use crate::vector::VectorError;

/// Concurrency and timeout settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Documents embedded at the same time
    pub workers: usize,
    /// Limit for a single backend call
    pub timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}

impl PipelineOptions {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            workers: config.worker_count(),
            timeout: config.timeout(),
        }
    }
}

/// Everything produced from one document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEmbedding {
    pub path: String,
    /// Every segmented block, embedded or not
    pub blocks: Vec<Block>,
    pub records: Vec<VectorRecord>,
    /// Blocks whose text trimmed to nothing
    pub skipped_empty: usize,
    pub token_count: usize,
}

/// A document that could not be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub path: String,
    pub reason: String,
}

/// Merged output of a corpus run, in document order.
#[derive(Debug, Default)]
pub struct CorpusEmbedding {
    pub records: Vec<VectorRecord>,
    pub locations: BlockLocationIndex,
    pub documents_embedded: usize,
    pub skipped_empty: usize,
    pub token_count: usize,
    pub failures: Vec<DocumentFailure>,
}

/// Summary of a reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusReport {
    pub documents_total: usize,
    pub documents_embedded: usize,
    pub blocks_embedded: usize,
    pub blocks_skipped_empty: usize,
    pub vectors_inserted: usize,
    pub vectors_already_present: usize,
    pub token_count: usize,
    pub store_count: usize,
    pub failures: Vec<DocumentFailure>,
}

impl CorpusReport {
    /// True when no document failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Segments, identifies and embeds documents.
#[derive(Clone)]
pub struct EmbeddingPipeline {
    backend: Arc<dyn EmbeddingBackend>,
    segmenter: Arc<dyn BlockSegmenter>,
    options: PipelineOptions,
}

impl std::fmt::Debug for EmbeddingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("model", &self.backend.model_name())
            .field("dimension", &self.backend.dimension())
            .field("options", &self.options)
            .finish()
    }
}

impl EmbeddingPipeline {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        segmenter: Arc<dyn BlockSegmenter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            backend,
            segmenter,
            options,
        }
    }

    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Embeds every non-empty block of one document.
    ///
    /// Fails as a whole on the first backend error, timeout or wrongly sized
    /// vector.
    pub async fn embed_document(
        &self,
        path: &str,
        content: &str,
    ) -> Result<DocumentEmbedding, EmbeddingError> {
        let blocks = self.segmenter.segment(content);
        let lines: Vec<&str> = content.lines().collect();

        let mut records = Vec::with_capacity(blocks.len());
        let mut skipped_empty = 0;
        let mut token_count = 0;

        for block in &blocks {
            let text = block_text(&lines, block.span);
            if text.is_empty() {
                skipped_empty += 1;
                continue;
            }

            let embedding = self.embed_text(text.clone()).await?;
            token_count += embedding.token_count;

            records.push(VectorRecord {
                id: content_id(path, &block.key),
                vector: embedding.vector,
                metadata: BlockMetadata {
                    key: block.key.clone(),
                    text,
                    document_path: path.to_string(),
                },
            });
        }

        debug!(
            "Embedded {path}: {} blocks, {} records, {skipped_empty} empty",
            blocks.len(),
            records.len()
        );

        Ok(DocumentEmbedding {
            path: path.to_string(),
            blocks,
            records,
            skipped_empty,
            token_count,
        })
    }

    /// Runs one backend call on the blocking pool under the configured timeout.
    ///
    /// A timeout abandons the call but cannot cancel it: the blocking thread
    /// runs to completion. A backend that serializes calls behind a lock, like
    /// [`FastEmbedBackend`](super::FastEmbedBackend), keeps later calls queued
    /// until the stuck one returns, so they may time out too.
    async fn embed_text(&self, text: String) -> Result<Embedding, EmbeddingError> {
        let backend = Arc::clone(&self.backend);
        let call = tokio::task::spawn_blocking(move || backend.embed(&text));

        let embedding = match tokio::time::timeout(self.options.timeout, call).await {
            Err(_) => {
                return Err(EmbeddingError::Timeout {
                    after: self.options.timeout,
                });
            }
            Ok(Err(join_error)) => {
                return Err(EmbeddingError::Backend(format!(
                    "embedding task failed: {join_error}"
                )));
            }
            Ok(Ok(result)) => result?,
        };

        if embedding.vector.is_empty() {
            return Err(EmbeddingError::EmptyEmbedding);
        }
        let expected = self.backend.dimension();
        if embedding.vector.len() != expected {
            return Err(VectorError::DimensionMismatch {
                expected,
                actual: embedding.vector.len(),
            }
            .into());
        }

        Ok(embedding)
    }

    /// Embeds documents with bounded concurrency and merges the results in
    /// input order. Never fails: per-document errors land in `failures`.
    pub async fn embed_documents(&self, documents: Vec<Document>) -> CorpusEmbedding {
        let total = documents.len();
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut paths: Vec<String> = Vec::with_capacity(total);
        let mut outcomes: Vec<Option<Result<DocumentEmbedding, String>>> =
            (0..total).map(|_| None).collect();

        for (position, document) in documents.into_iter().enumerate() {
            paths.push(document.path.clone());

            // Waiting here keeps at most `workers` documents in flight
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    outcomes[position] = Some(Err(e.to_string()));
                    continue;
                }
            };

            let pipeline = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = pipeline
                    .embed_document(&document.path, &document.content)
                    .await
                    .map_err(|e| e.to_string());
                (position, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, result)) => outcomes[position] = Some(result),
                Err(e) => warn!("Embedding task did not complete: {e}"),
            }
        }

        let mut merged = CorpusEmbedding::default();
        for (outcome, path) in outcomes.into_iter().zip(paths) {
            match outcome {
                Some(Ok(document)) => {
                    merged.locations.insert_document(&document.path, &document.blocks);
                    merged.records.extend(document.records);
                    merged.skipped_empty += document.skipped_empty;
                    merged.token_count += document.token_count;
                    merged.documents_embedded += 1;
                }
                Some(Err(reason)) => {
                    warn!("Failed to embed {path}: {reason}");
                    merged.failures.push(DocumentFailure { path, reason });
                }
                None => {
                    let reason = "embedding task was aborted".to_string();
                    warn!("Failed to embed {path}: {reason}");
                    merged.failures.push(DocumentFailure { path, reason });
                }
            }
        }

        merged
    }

    /// Embeds a corpus and commits it.
    ///
    /// Embedding runs without any lock. The store write lock is then held for
    /// the bulk add, the location index save and the store save, with no
    /// await in between.
    pub async fn embed_corpus(
        &self,
        documents: Vec<Document>,
        store: &RwLock<VectorStore>,
        locator: &RwLock<BlockLocator>,
    ) -> IndexResult<CorpusReport> {
        let documents_total = documents.len();
        let CorpusEmbedding {
            records,
            locations,
            documents_embedded,
            skipped_empty,
            token_count,
            failures,
        } = self.embed_documents(documents).await;
        let blocks_embedded = records.len();

        let mut store = store.write();
        let summary = store.add(records)?;
        {
            let mut locator = locator.write();
            locator.index_mut().merge(locations);
            locator.save()?;
        }
        store.save()?;
        let store_count = store.count()?;

        info!(
            "Indexed {documents_embedded}/{documents_total} documents: {} new vectors, {} already present, {} failed",
            summary.inserted,
            summary.skipped,
            failures.len()
        );

        Ok(CorpusReport {
            documents_total,
            documents_embedded,
            blocks_embedded,
            blocks_skipped_empty: skipped_empty,
            vectors_inserted: summary.inserted,
            vectors_already_present: summary.skipped,
            token_count,
            store_count,
            failures,
        })
    }
}

/// Text of `span` within `lines`, trimmed. Out-of-range spans are clipped.
fn block_text(lines: &[&str], span: BlockSpan) -> String {
    let start = span.start.max(1) as usize - 1;
    let end = (span.end as usize).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{MarkdownSegmenter, estimate_tokens};
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    /// Deterministic 4-dimensional backend. Texts containing `FAIL` error out,
    /// texts containing `SLOW` block past any short timeout.
    struct KeywordBackend;

    impl EmbeddingBackend for KeywordBackend {
        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            if text.contains("FAIL") {
                return Err(EmbeddingError::Backend("rate limited".to_string()));
            }
            if text.contains("SLOW") {
                std::thread::sleep(Duration::from_millis(600));
            }
            let lower = text.to_lowercase();
            let vector = vec![
                1.0 + lower.matches("rust").count() as f32,
                lower.matches("python").count() as f32,
                lower.matches("garden").count() as f32,
                0.1,
            ];
            Ok(Embedding {
                vector,
                token_count: estimate_tokens(text),
            })
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    /// Returns vectors of the wrong size.
    struct ShortBackend;

    impl EmbeddingBackend for ShortBackend {
        fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Ok(Embedding {
                vector: vec![1.0, 2.0],
                token_count: 1,
            })
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "short-test"
        }
    }

    fn pipeline_with(backend: Arc<dyn EmbeddingBackend>, timeout: Duration) -> EmbeddingPipeline {
        EmbeddingPipeline::new(
            backend,
            Arc::new(MarkdownSegmenter::new()),
            PipelineOptions {
                workers: 2,
                timeout,
            },
        )
    }

    fn pipeline() -> EmbeddingPipeline {
        pipeline_with(Arc::new(KeywordBackend), Duration::from_secs(5))
    }

    fn doc(path: &str, content: &str) -> Document {
        Document {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_block_text_slices_and_trims() {
        let lines = vec!["# Title", "", "  body line  ", "", "next"];
        assert_eq!(block_text(&lines, BlockSpan::new(2, 4)), "body line");
        assert_eq!(block_text(&lines, BlockSpan::new(1, 1)), "# Title");
        assert_eq!(block_text(&lines, BlockSpan::new(4, 10)), "next");
        assert_eq!(block_text(&lines, BlockSpan::new(9, 12)), "");
    }

    #[tokio::test]
    async fn test_embed_document_builds_records() {
        let content = "# Rust\nRust ownership\n# Garden\nTomatoes in the garden";
        let embedded = pipeline().embed_document("notes.md", content).await.unwrap();

        assert_eq!(embedded.blocks.len(), 2);
        assert_eq!(embedded.records.len(), 2);
        assert_eq!(embedded.skipped_empty, 0);

        let first = &embedded.records[0];
        assert_eq!(first.id, content_id("notes.md", "#Rust"));
        assert_eq!(first.metadata.key, "#Rust");
        assert_eq!(first.metadata.text, "# Rust\nRust ownership");
        assert_eq!(first.metadata.document_path, "notes.md");
        assert_eq!(first.vector, vec![3.0, 0.0, 0.0, 0.1]);
        assert_eq!(embedded.token_count, 4 + 6);
    }

    #[tokio::test]
    async fn test_empty_blocks_are_skipped_but_located() {
        let content = "\n\n# Filled\ntext\n# Blank\n";
        let embedded = pipeline().embed_document("a.md", content).await.unwrap();

        // "#" preamble is blank; "#Blank" holds only its heading line
        let keys: Vec<&str> = embedded.blocks.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["#", "#Filled", "#Blank"]);
        assert_eq!(embedded.skipped_empty, 1);
        assert_eq!(embedded.records.len(), 2);
    }

    #[tokio::test]
    async fn test_backend_failure_fails_the_document() {
        let result = pipeline()
            .embed_document("bad.md", "# Ok\nfine\n# Broken\nFAIL here")
            .await;
        assert!(matches!(result, Err(EmbeddingError::Backend(_))));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let pipeline = pipeline_with(Arc::new(KeywordBackend), Duration::from_millis(20));
        let result = pipeline.embed_document("slow.md", "SLOW text").await;
        assert!(matches!(result, Err(EmbeddingError::Timeout { .. })));
    }

    /// Serializes calls on a lock the way a single shared model does.
    struct LockedBackend {
        model: std::sync::Mutex<KeywordBackend>,
    }

    impl EmbeddingBackend for LockedBackend {
        fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
            let model = self
                .model
                .lock()
                .map_err(|_| EmbeddingError::Backend("poisoned".to_string()))?;
            model.embed(text)
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "locked-test"
        }
    }

    #[tokio::test]
    async fn test_timed_out_call_keeps_holding_a_locked_backend() {
        let backend = LockedBackend {
            model: std::sync::Mutex::new(KeywordBackend),
        };
        let pipeline = pipeline_with(Arc::new(backend), Duration::from_millis(100));

        let slow = pipeline.embed_document("slow.md", "SLOW text").await;
        assert!(matches!(slow, Err(EmbeddingError::Timeout { .. })));

        // The abandoned call still owns the lock
        let queued = pipeline.embed_document("fast.md", "rust").await;
        assert!(matches!(queued, Err(EmbeddingError::Timeout { .. })));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(pipeline.embed_document("fast.md", "rust").await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let pipeline = pipeline_with(Arc::new(ShortBackend), Duration::from_secs(5));
        let result = pipeline.embed_document("a.md", "some text").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Dimension(VectorError::DimensionMismatch {
                expected: 4,
                actual: 2
            }))
        ));
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_document() {
        let documents = vec![
            doc("a.md", "# A\nrust"),
            doc("b.md", "# B\nFAIL"),
            doc("c.md", "# C\ngarden"),
            doc("d.md", "# D\nSLOW"),
        ];
        let pipeline = pipeline_with(Arc::new(KeywordBackend), Duration::from_millis(200));
        let merged = pipeline.embed_documents(documents).await;

        assert_eq!(merged.documents_embedded, 2);
        let failed: Vec<&str> = merged.failures.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(failed, vec!["b.md", "d.md"]);
        assert!(merged.failures[1].reason.contains("timed out"));

        // Records keep document order
        let paths: Vec<&str> = merged
            .records
            .iter()
            .map(|r| r.metadata.document_path.as_str())
            .collect();
        assert_eq!(paths, vec!["a.md", "c.md"]);
        assert!(merged.locations.contains_document("a.md"));
        assert!(!merged.locations.contains_document("b.md"));
    }

    #[tokio::test]
    async fn test_embed_corpus_commits_store_and_locations() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = VectorStore::new(temp_dir.path(), StoreOptions::default());
        store.initialize("corpus", 4, 100).unwrap();
        let store = RwLock::new(store);
        let locator = RwLock::new(BlockLocator::open(temp_dir.path()));

        let documents = vec![
            doc("rust.md", "# Rust\nrust rust\n# Empty\n"),
            doc("broken.md", "# X\nFAIL"),
        ];
        let report = pipeline()
            .embed_corpus(documents.clone(), &store, &locator)
            .await
            .unwrap();

        assert_eq!(report.documents_total, 2);
        assert_eq!(report.documents_embedded, 1);
        assert_eq!(report.vectors_inserted, 2);
        assert_eq!(report.store_count, 2);
        assert!(!report.is_complete());
        assert_eq!(report.failures[0].path, "broken.md");

        assert_eq!(locator.read().keys_at("rust.md", 2), vec!["#Rust"]);
        assert!(
            store
                .read()
                .record(content_id("rust.md", "#Rust"))
                .unwrap()
                .is_some()
        );

        // Persisted: a fresh store and locator see the same state
        let mut reopened = VectorStore::new(temp_dir.path(), StoreOptions::default());
        reopened.initialize("corpus", 4, 100).unwrap();
        assert_eq!(reopened.count().unwrap(), 2);
        assert_eq!(
            BlockLocator::open(temp_dir.path()).keys_at("rust.md", 3),
            vec!["#Empty"]
        );

        // Reindexing the same corpus inserts nothing new
        let again = pipeline()
            .embed_corpus(documents, &store, &locator)
            .await
            .unwrap();
        assert_eq!(again.vectors_inserted, 0);
        assert_eq!(again.vectors_already_present, 2);
        assert_eq!(again.store_count, 2);
    }
}
