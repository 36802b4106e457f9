//! Persistent vector store.
//!
//! [`VectorStore`] owns the ANN graph, the id/label bijection and the record
//! map, and moves through a small lifecycle:
//!
//! ```text
//! Uninitialized --initialize--> Ready --reset--> Resetting --> Ready
//! ```
//!
//! Every operation other than `initialize` requires `Ready` and fails with
//! [`StoreError::NotInitialized`] otherwise. Mutations take `&mut self`; callers
//! sharing a store across threads wrap it in a lock and hold it for the whole
//! of an `add` + `save`.

mod error;
mod mapping;
mod persist;

pub use error::{StoreError, StoreResult};
pub use mapping::{IdentityMap, MappingError};
pub use persist::{
    ArtifactPaths, LoadOutcome, MANIFEST_FORMAT_VERSION, PersistedMaps, StoreManifest,
    calculate_checksum, get_utc_timestamp, read_manifest,
};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::types::{ContentId, Label, SearchResult, VectorRecord};
use crate::vector::{AnnGraph, GraphParams, Score, VectorDimension, VectorError, read_graph_file};
use persist::SaveInput;

/// Tunables that stay fixed for the lifetime of a store handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub ef_search: usize,
    pub ef_construction: usize,
    /// Refuse to open a store whose map artifacts fail validation
    pub strict_load: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        let params = GraphParams::default();
        Self {
            ef_search: params.ef_search,
            ef_construction: params.ef_construction,
            strict_load: false,
        }
    }
}

/// Outcome of one `add` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddSummary {
    pub inserted: usize,
    /// Records whose id was already stored, or repeated within the batch
    pub skipped: usize,
}

/// Live store contents.
struct StoreCore {
    paths: ArtifactPaths,
    graph: AnnGraph,
    identity: IdentityMap,
    vector_data: HashMap<ContentId, VectorRecord>,
    created_at: u64,
}

enum StoreState {
    Uninitialized,
    Ready(Box<StoreCore>),
    Resetting,
}

/// Persistent approximate nearest-neighbor store keyed by [`ContentId`].
pub struct VectorStore {
    root: PathBuf,
    name: Option<String>,
    options: StoreOptions,
    state: StoreState,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            StoreState::Uninitialized => "uninitialized",
            StoreState::Ready(_) => "ready",
            StoreState::Resetting => "resetting",
        };
        f.debug_struct("VectorStore")
            .field("root", &self.root)
            .field("name", &self.name)
            .field("state", &state)
            .field("count", &self.count().ok())
            .finish()
    }
}

impl VectorStore {
    /// Creates an uninitialized store whose artifacts live under `root`.
    pub fn new(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            name: None,
            options,
            state: StoreState::Uninitialized,
        }
    }

    /// Opens the store `name`, creating and persisting an empty one if no
    /// graph exists yet.
    ///
    /// Returns `true` when an existing store was loaded and `false` when a
    /// fresh one was created. Calling it again reloads the on-disk state.
    pub fn initialize(&mut self, name: &str, dims: usize, capacity: usize) -> StoreResult<bool> {
        let dimension = VectorDimension::new(dims)?;
        let paths = ArtifactPaths::new(&self.root, name);

        if !paths.graph.exists() {
            info!("Creating vector store '{name}' (dimension {dims}, capacity {capacity})");
            let core = StoreCore {
                graph: AnnGraph::new(dimension, self.graph_params(capacity)),
                paths,
                identity: IdentityMap::new(),
                vector_data: HashMap::new(),
                created_at: get_utc_timestamp(),
            };
            self.state = StoreState::Ready(Box::new(core));
            self.name = Some(name.to_string());
            self.save()?;
            return Ok(false);
        }

        let core = self.load(paths, dimension, capacity)?;
        self.state = StoreState::Ready(Box::new(core));
        self.name = Some(name.to_string());
        Ok(true)
    }

    /// Reads the graph and its maps. Map problems degrade to empty maps unless
    /// `strict_load` is set; a graph that cannot be read is an error.
    fn load(
        &self,
        paths: ArtifactPaths,
        dimension: VectorDimension,
        capacity: usize,
    ) -> StoreResult<StoreCore> {
        let snapshot = read_graph_file(&paths.graph)?;
        if snapshot.header.dimension != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: dimension.get(),
                actual: snapshot.header.dimension.get(),
            }
            .into());
        }
        let graph = AnnGraph::from_snapshot(snapshot, capacity, self.options.ef_search)?;

        let maps = match persist::load_maps(&paths, graph.len(), dimension.get()) {
            LoadOutcome::Loaded(maps) => maps,
            LoadOutcome::Absent => {
                warn!(
                    "No committed maps found for {}; continuing with empty maps",
                    paths.graph.display()
                );
                PersistedMaps::default()
            }
            LoadOutcome::Corrupt { reason } => {
                if self.options.strict_load {
                    return Err(StoreError::CorruptArtifacts { reason });
                }
                warn!("Discarding persisted maps: {reason}");
                PersistedMaps::default()
            }
        };

        info!(
            "Loaded vector store from {} ({} vectors, {} mapped)",
            paths.graph.display(),
            graph.len(),
            maps.identity.len()
        );

        Ok(StoreCore {
            paths,
            graph,
            identity: maps.identity,
            vector_data: maps.vector_data,
            created_at: maps.created_at.unwrap_or_else(get_utc_timestamp),
        })
    }

    /// Inserts records whose ids are not stored yet.
    ///
    /// Stored ids are immutable: a record with a known id is skipped, never
    /// updated. The batch is validated up front, so a bad vector rejects the
    /// whole call and leaves the store unchanged.
    pub fn add(&mut self, records: Vec<VectorRecord>) -> StoreResult<AddSummary> {
        let core = self.core_mut()?;
        let dimension = core.graph.dimension();

        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        let mut skipped = 0;
        for record in records {
            if core.identity.contains_id(record.id) || !seen.insert(record.id) {
                skipped += 1;
                continue;
            }
            dimension.validate_vector(&record.vector)?;
            if record.vector.iter().any(|v| !v.is_finite()) {
                return Err(VectorError::NonFiniteVector {
                    id: record.id.value(),
                }
                .into());
            }
            fresh.push(record);
        }

        if fresh.is_empty() {
            debug!("Nothing new to add ({skipped} already stored)");
            return Ok(AddSummary {
                inserted: 0,
                skipped,
            });
        }

        let vectors = fresh.iter().map(|r| r.vector.clone()).collect();
        let labels = core.graph.insert_batch(vectors)?;
        let inserted = labels.len();

        for (label, record) in labels.into_iter().zip(fresh) {
            core.identity
                .bind(record.id, label)
                .map_err(|source| StoreError::IdentityConflict {
                    id: record.id.value(),
                    label: label.value(),
                    source,
                })?;
            core.vector_data.insert(record.id, record);
        }

        debug!(
            "Added {inserted} vectors, skipped {skipped} already present (store holds {})",
            core.graph.len()
        );
        Ok(AddSummary { inserted, skipped })
    }

    /// Approximate k-nearest-neighbor search, closest first.
    ///
    /// Hits whose label or record cannot be resolved are dropped, so fewer
    /// than `k` results may come back.
    pub fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<SearchResult>> {
        let core = self.core()?;
        let hits = core.graph.search(query, k)?;

        let mut results = Vec::with_capacity(hits.len());
        let mut orphaned = 0usize;
        for (label, distance) in hits {
            let Some(record) = core
                .identity
                .id_of(label)
                .and_then(|id| core.vector_data.get(&id))
            else {
                orphaned += 1;
                continue;
            };
            results.push(SearchResult {
                id: record.id,
                score: Score::from_distance(distance),
                metadata: record.metadata.clone(),
            });
        }

        if orphaned > 0 {
            debug!("Skipped {orphaned} orphaned search hits");
        }
        Ok(results)
    }

    /// Persists the graph and all maps, committing with the manifest.
    pub fn save(&self) -> StoreResult<()> {
        let core = self.core()?;
        let graph_bytes = core.graph.encode()?;
        persist::save_artifacts(
            &core.paths,
            SaveInput {
                graph_bytes: &graph_bytes,
                graph_len: core.graph.len(),
                identity: &core.identity,
                vector_data: &core.vector_data,
                dimension: core.graph.dimension().get(),
                capacity: core.graph.capacity(),
                created_at: core.created_at,
            },
        )?;
        Ok(())
    }

    /// Discards everything and persists a fresh, empty store.
    pub fn reset(&mut self, capacity: usize, dims: usize) -> StoreResult<()> {
        let dimension = VectorDimension::new(dims)?;
        let paths = match std::mem::replace(&mut self.state, StoreState::Resetting) {
            StoreState::Ready(core) => core.paths,
            other => {
                self.state = other;
                return Err(StoreError::NotInitialized);
            }
        };

        info!("Resetting vector store (dimension {dims}, capacity {capacity})");
        // The save below rewrites every artifact anyway
        if let Err(e) = persist::remove_artifacts(&paths) {
            warn!("Could not remove old store artifacts: {e}");
        }
        let core = StoreCore {
            graph: AnnGraph::new(dimension, self.graph_params(capacity)),
            paths,
            identity: IdentityMap::new(),
            vector_data: HashMap::new(),
            created_at: get_utc_timestamp(),
        };
        self.state = StoreState::Ready(Box::new(core));
        self.save()
    }

    /// Number of vectors in the graph.
    pub fn count(&self) -> StoreResult<usize> {
        Ok(self.core()?.graph.len())
    }

    /// Stored vector for `id`, if any.
    pub fn vector_of(&self, id: ContentId) -> StoreResult<Option<&[f32]>> {
        let core = self.core()?;
        Ok(core.vector_data.get(&id).map(|r| r.vector.as_slice()))
    }

    /// Stored record for `id`, if any.
    pub fn record(&self, id: ContentId) -> StoreResult<Option<&VectorRecord>> {
        Ok(self.core()?.vector_data.get(&id))
    }

    pub fn label_of(&self, id: ContentId) -> StoreResult<Option<Label>> {
        Ok(self.core()?.identity.label_of(id))
    }

    /// The id/label bijection.
    pub fn identity_map(&self) -> StoreResult<&IdentityMap> {
        Ok(&self.core()?.identity)
    }

    /// Number of stored records.
    pub fn record_count(&self) -> StoreResult<usize> {
        Ok(self.core()?.vector_data.len())
    }

    pub fn dimension(&self) -> StoreResult<usize> {
        Ok(self.core()?.graph.dimension().get())
    }

    pub fn capacity(&self) -> StoreResult<usize> {
        Ok(self.core()?.graph.capacity())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, StoreState::Ready(_))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths of the artifacts of the open store.
    pub fn artifact_paths(&self) -> StoreResult<&ArtifactPaths> {
        Ok(&self.core()?.paths)
    }

    fn graph_params(&self, capacity: usize) -> GraphParams {
        GraphParams {
            capacity,
            ef_construction: self.options.ef_construction,
            ef_search: self.options.ef_search,
        }
    }

    fn core(&self) -> StoreResult<&StoreCore> {
        match &self.state {
            StoreState::Ready(core) => Ok(&**core),
            _ => Err(StoreError::NotInitialized),
        }
    }

    fn core_mut(&mut self) -> StoreResult<&mut StoreCore> {
        match &mut self.state {
            StoreState::Ready(core) => Ok(&mut **core),
            _ => Err(StoreError::NotInitialized),
        }
    }
}
