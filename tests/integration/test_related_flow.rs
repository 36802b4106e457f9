//! Discover a corpus on disk, index it and ask for related content
//!
//! Uses a keyword backend so results are predictable without a model.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use relata::config::{CorpusConfig, Settings};
use relata::embedding::{Embedding, EmbeddingBackend, EmbeddingError, MarkdownSegmenter};
use relata::{Corpus, RelatedContent};
use tempfile::TempDir;

const TOPICS: [&str; 5] = ["tokio", "serde", "garden", "bread", "broken"];

/// One axis per topic word, plus a constant axis so no vector is zero.
/// Text containing "broken" fails, "sleepy" takes longer than the timeout.
struct KeywordBackend;

impl EmbeddingBackend for KeywordBackend {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let lower = text.to_lowercase();
        if lower.contains("broken") {
            return Err(EmbeddingError::Backend("backend refused input".to_string()));
        }
        if lower.contains("sleepy") {
            std::thread::sleep(Duration::from_millis(600));
        }
        let mut vector: Vec<f32> = TOPICS[..4]
            .iter()
            .map(|topic| lower.matches(topic).count() as f32)
            .collect();
        vector.push(0.05);
        Ok(Embedding {
            vector,
            token_count: text.split_whitespace().count(),
        })
    }

    fn dimension(&self) -> usize {
        5
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn write_corpus(root: &Path) {
    write(
        root,
        "rust/async.md",
        "Notes on async.\n\n# Runtime\ntokio runtime and tokio tasks\n\n# Serialization\nserde derive macros\n",
    );
    write(
        root,
        "rust/data.md",
        "# Formats\nserde json and serde toml\n# Executors\ntokio executors compared\n",
    );
    write(
        root,
        "home/kitchen.md",
        "# Sourdough\nbread starter and bread flour\n# Herbs\ngarden herbs for bread\n",
    );
    write(root, "home/broken.md", "# Oops\nthis one is broken\n");
    write(root, "drafts/ignored.md", "# Draft\ntokio draft\n");
    write(root, ".relataignore", "drafts/\n");
}

fn settings(index_dir: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.index_path = index_dir.to_path_buf();
    settings.store.dimension = 5;
    settings.store.capacity = 200;
    settings.embedding.workers = 3;
    settings.embedding.timeout_ms = 300;
    settings.related.limit = 3;
    settings
}

fn open(settings: &Settings) -> RelatedContent {
    RelatedContent::open(
        settings,
        Arc::new(KeywordBackend),
        Arc::new(MarkdownSegmenter::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_index_then_find_related_across_documents() {
    let corpus_dir = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    write_corpus(corpus_dir.path());

    let corpus = Corpus::discover(corpus_dir.path(), &CorpusConfig::default()).unwrap();
    let paths: Vec<&str> = corpus.documents.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["home/broken.md", "home/kitchen.md", "rust/async.md", "rust/data.md"]
    );

    let service = open(&settings(index_dir.path()));
    let report = service.reindex_corpus(corpus).await.unwrap();

    assert_eq!(report.documents_total, 4);
    assert_eq!(report.documents_embedded, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "home/broken.md");
    // Preamble, Runtime, Serialization + Formats, Executors + Sourdough, Herbs
    assert_eq!(report.store_count, 7);

    // Line 4 of async.md sits in "# Runtime"
    let results = service.find_related("rust/async.md", 4).unwrap();
    assert_eq!(results[0].metadata.document_path, "rust/data.md");
    assert_eq!(results[0].metadata.key, "#Executors");
    assert!(results.len() <= 3);
    assert!(
        results
            .iter()
            .all(|r| !(r.metadata.document_path == "rust/async.md" && r.metadata.key == "#Runtime"))
    );
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let results = service.find_related("home/kitchen.md", 2).unwrap();
    assert_eq!(results[0].metadata.key, "#Herbs");
}

#[tokio::test]
async fn test_reindex_is_incremental_and_survives_restart() {
    let corpus_dir = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    write_corpus(corpus_dir.path());
    let settings = settings(index_dir.path());

    {
        let service = open(&settings);
        let corpus = Corpus::discover(corpus_dir.path(), &settings.corpus).unwrap();
        let first = service.reindex_corpus(corpus).await.unwrap();
        assert_eq!(first.vectors_inserted, 7);
    }

    write(
        corpus_dir.path(),
        "rust/more.md",
        "# Codecs\nserde codecs\n",
    );

    let service = open(&settings);
    let corpus = Corpus::discover(corpus_dir.path(), &settings.corpus).unwrap();
    let second = service.reindex_corpus(corpus).await.unwrap();
    assert_eq!(second.vectors_inserted, 1);
    assert_eq!(second.vectors_already_present, 7);
    assert_eq!(second.store_count, 8);

    let status = service.status().unwrap();
    assert_eq!(status.count, 8);
    assert_eq!(status.documents, 4);
    assert_eq!(status.model, "keyword");
}

#[tokio::test]
async fn test_slow_documents_time_out_without_blocking_others() {
    let corpus_dir = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    write(corpus_dir.path(), "slow.md", "# Nap\nsleepy tokio\n");
    write(corpus_dir.path(), "fast.md", "# Quick\ntokio quick\n");

    let service = open(&settings(index_dir.path()));
    let corpus = Corpus::discover(corpus_dir.path(), &CorpusConfig::default()).unwrap();
    let report = service.reindex_corpus(corpus).await.unwrap();

    assert_eq!(report.documents_embedded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "slow.md");
    assert!(service.find_related("fast.md", 1).unwrap().is_empty());
    assert_eq!(service.status().unwrap().count, 1);
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let corpus_dir = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    write_corpus(corpus_dir.path());
    let settings = settings(index_dir.path());

    let service = open(&settings);
    let corpus = Corpus::discover(corpus_dir.path(), &settings.corpus).unwrap();
    service.reindex_corpus(corpus).await.unwrap();
    service.reset().unwrap();

    let reopened = open(&settings);
    let status = reopened.status().unwrap();
    assert_eq!(status.count, 0);
    assert_eq!(status.documents, 0);
    assert!(reopened.find_related("rust/async.md", 4).unwrap().is_empty());
}
