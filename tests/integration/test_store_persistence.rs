//! Vector store persistence through the public API
//!
//! Exercises save/reopen round trips on a few hundred vectors, artifact
//! damage on disk, and reset.

use relata::store::{StoreError, StoreOptions, VectorStore};
use relata::types::{BlockMetadata, ContentId, VectorRecord};
use relata::content_id;
use tempfile::TempDir;

const DIMENSION: usize = 16;
const STORE_NAME: &str = "saved_index";

/// Deterministic vectors spread over the unit sphere's positive orthant.
fn vector_for(seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..DIMENSION)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 1000) as f32 / 1000.0
        })
        .collect()
}

fn records(count: u64) -> Vec<VectorRecord> {
    (0..count)
        .map(|i| {
            let key = format!("#Block{i}");
            VectorRecord {
                id: content_id("corpus.md", &key),
                vector: vector_for(i),
                metadata: BlockMetadata {
                    key,
                    text: format!("block number {i}"),
                    document_path: "corpus.md".to_string(),
                },
            }
        })
        .collect()
}

fn open(dir: &TempDir, options: StoreOptions) -> (VectorStore, bool) {
    let mut store = VectorStore::new(dir.path(), options);
    let loaded = store.initialize(STORE_NAME, DIMENSION, 1000).unwrap();
    (store, loaded)
}

fn top_ids(store: &VectorStore, query: &[f32], k: usize) -> Vec<ContentId> {
    store
        .search(query, k)
        .unwrap()
        .into_iter()
        .map(|hit| hit.id)
        .collect()
}

#[test]
fn test_round_trip_preserves_count_and_rankings() {
    let temp_dir = TempDir::new().unwrap();
    let queries: Vec<Vec<f32>> = (1000..1010).map(vector_for).collect();

    let before: Vec<Vec<ContentId>> = {
        let (mut store, loaded) = open(&temp_dir, StoreOptions::default());
        assert!(!loaded);
        store.add(records(300)).unwrap();
        store.save().unwrap();
        queries.iter().map(|q| top_ids(&store, q, 10)).collect()
    };

    let (reopened, loaded) = open(&temp_dir, StoreOptions::default());
    assert!(loaded);
    assert_eq!(reopened.count().unwrap(), 300);
    assert_eq!(reopened.record_count().unwrap(), 300);

    let after: Vec<Vec<ContentId>> = queries.iter().map(|q| top_ids(&reopened, q, 10)).collect();
    assert_eq!(before, after);
}

#[test]
fn test_incremental_adds_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let all = records(50);

    {
        let (mut store, _) = open(&temp_dir, StoreOptions::default());
        store.add(all[..30].to_vec()).unwrap();
        store.save().unwrap();
    }

    let (mut store, _) = open(&temp_dir, StoreOptions::default());
    let summary = store.add(all.clone()).unwrap();
    assert_eq!(summary.inserted, 20);
    assert_eq!(summary.skipped, 30);
    store.save().unwrap();

    let (reopened, _) = open(&temp_dir, StoreOptions::default());
    assert_eq!(reopened.count().unwrap(), 50);
    let hit = &reopened.search(&all[42].vector, 1).unwrap()[0];
    assert_eq!(hit.id, all[42].id);
    assert_eq!(hit.metadata.key, "#Block42");
    assert!((hit.score.get() - 1.0).abs() < 1e-4);
}

#[test]
fn test_tampered_vector_data_is_detected() {
    let temp_dir = TempDir::new().unwrap();
    let paths = {
        let (mut store, _) = open(&temp_dir, StoreOptions::default());
        store.add(records(20)).unwrap();
        store.save().unwrap();
        store.artifact_paths().unwrap().clone()
    };

    // Valid JSON with different content fails the checksum
    std::fs::write(&paths.vector_data, b"{}").unwrap();

    let (lenient, loaded) = open(&temp_dir, StoreOptions::default());
    assert!(loaded);
    assert_eq!(lenient.record_count().unwrap(), 0);
    assert!(lenient.search(&vector_for(3), 5).unwrap().is_empty());

    let strict = StoreOptions {
        strict_load: true,
        ..StoreOptions::default()
    };
    let mut store = VectorStore::new(temp_dir.path(), strict);
    let result = store.initialize(STORE_NAME, DIMENSION, 1000);
    assert!(matches!(result, Err(StoreError::CorruptArtifacts { .. })));
}

#[test]
fn test_reset_persists_an_empty_store() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (mut store, _) = open(&temp_dir, StoreOptions::default());
        store.add(records(25)).unwrap();
        store.save().unwrap();
        store.reset(1000, DIMENSION).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.identity_map().unwrap().is_empty());
    }

    let (reopened, loaded) = open(&temp_dir, StoreOptions::default());
    assert!(loaded);
    assert_eq!(reopened.count().unwrap(), 0);
    assert_eq!(reopened.record_count().unwrap(), 0);
}

#[test]
fn test_end_to_end_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = VectorStore::new(temp_dir.path(), StoreOptions::default());
    store.initialize("scenario", 4, 100).unwrap();

    let record = |id: u64, vector: Vec<f32>, key: &str| VectorRecord {
        id: ContentId::new(id),
        vector,
        metadata: BlockMetadata {
            key: key.to_string(),
            text: key.to_string(),
            document_path: "doc.md".to_string(),
        },
    };
    store
        .add(vec![
            record(1, vec![1.0, 0.0, 0.0, 0.0], "A"),
            record(2, vec![0.0, 1.0, 0.0, 0.0], "B"),
        ])
        .unwrap();

    let results = store.search(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, ContentId::new(1));
    assert!((results[0].score.get() - 1.0).abs() < 1e-6);
}
