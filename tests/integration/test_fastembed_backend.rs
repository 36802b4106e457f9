//! Real-model checks for related-content ranking
//!
//! These download the embedding model and are skipped by default.

use std::fs;
use std::sync::Arc;

use relata::config::Settings;
use relata::{Corpus, FastEmbedBackend, MarkdownSegmenter, RelatedContent};
use tempfile::TempDir;

/// Get a unique cache directory for each test to avoid conflicts
fn get_test_cache_dir(test_name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "relata_test_fastembed_{}_{}",
        test_name,
        std::process::id()
    ))
}

#[tokio::test]
#[ignore = "Downloads 86MB model - run with --ignored for embedding checks"]
async fn test_semantic_neighbors_with_real_model() {
    let corpus_dir = TempDir::new().unwrap();
    let index_dir = TempDir::new().unwrap();
    fs::write(
        corpus_dir.path().join("notes.md"),
        "# Ownership\nEach value in Rust has a single owner that drops it.\n\
         # Borrowing\nReferences let code use a value without taking ownership.\n\
         # Baking\nKnead the dough and let it rise overnight before baking.\n",
    )
    .unwrap();

    let backend = FastEmbedBackend::new(
        "AllMiniLML6V2",
        get_test_cache_dir("semantic_neighbors"),
        false,
    )
    .unwrap();

    let mut settings = Settings::default();
    settings.index_path = index_dir.path().to_path_buf();
    let service = RelatedContent::open(
        &settings,
        Arc::new(backend),
        Arc::new(MarkdownSegmenter::new()),
    )
    .unwrap();

    let corpus = Corpus::discover(corpus_dir.path(), &settings.corpus).unwrap();
    let report = service.reindex_corpus(corpus).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.store_count, 3);

    let results = service.find_related("notes.md", 2).unwrap();
    assert_eq!(results[0].metadata.key, "#Borrowing");
    assert_eq!(results[1].metadata.key, "#Baking");
    assert!(results[0].score > results[1].score);
}
