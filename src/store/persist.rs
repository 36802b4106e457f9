//! On-disk layout of a vector store.
//!
//! A store named `name` under `root` consists of five files:
//!
//! - `<name>.graph`: the ANN graph (see [`crate::vector::encode_graph`])
//! - `<name>.id_to_label.json`, `<name>.label_to_id.json`: the two halves of the bijection
//! - `<name>.vector_data.json`: every stored record, keyed by content id
//! - `<name>.manifest.json`: versions, counts and a SHA-256 checksum per artifact
//!
//! Each file is written to a `.tmp` sibling and renamed into place. The
//! manifest goes last and is the commit point: a save interrupted before the
//! manifest rename leaves checksums that no longer match, which loads as
//! [`LoadOutcome::Corrupt`] instead of silently mixing two generations.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::identity::HASH_SCHEME_VERSION;
use crate::store::error::{StoreError, StoreResult};
use crate::store::mapping::IdentityMap;
use crate::types::{ContentId, Label, VectorRecord};
use crate::vector::GRAPH_FORMAT_VERSION;

/// Version of the manifest and map artifact layout.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

const GRAPH_ARTIFACT: &str = "graph";
const ID_TO_LABEL_ARTIFACT: &str = "id_to_label";
const LABEL_TO_ID_ARTIFACT: &str = "label_to_id";
const VECTOR_DATA_ARTIFACT: &str = "vector_data";

/// Paths of every artifact belonging to one named store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub graph: PathBuf,
    pub id_to_label: PathBuf,
    pub label_to_id: PathBuf,
    pub vector_data: PathBuf,
    pub manifest: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            graph: root.join(format!("{name}.graph")),
            id_to_label: root.join(format!("{name}.id_to_label.json")),
            label_to_id: root.join(format!("{name}.label_to_id.json")),
            vector_data: root.join(format!("{name}.vector_data.json")),
            manifest: root.join(format!("{name}.manifest.json")),
        }
    }

    fn all(&self) -> [&Path; 5] {
        [
            &self.graph,
            &self.id_to_label,
            &self.label_to_id,
            &self.vector_data,
            &self.manifest,
        ]
    }
}

/// Commit record of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format_version: u32,
    pub graph_format_version: u32,
    pub hash_scheme_version: u32,
    pub dimension: usize,
    pub capacity: usize,
    /// Vectors in the graph, mapped or not
    pub count: usize,
    /// Ids bound to a label
    pub mapped: usize,
    /// Unix timestamp of the first save of this store generation
    pub created_at: u64,
    /// Unix timestamp of the latest save
    pub updated_at: u64,
    /// Hex SHA-256 per artifact, keyed by artifact name
    pub checksums: BTreeMap<String, String>,
}

/// Maps recovered from disk.
#[derive(Debug, Default)]
pub struct PersistedMaps {
    pub identity: IdentityMap,
    pub vector_data: HashMap<ContentId, VectorRecord>,
    pub created_at: Option<u64>,
}

/// Result of reading the map artifacts.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(PersistedMaps),
    /// No manifest on disk: nothing was ever committed.
    Absent,
    /// A manifest exists but the artifacts do not check out.
    Corrupt { reason: String },
}

/// What a save writes besides the graph bytes.
pub struct SaveInput<'a> {
    pub graph_bytes: &'a [u8],
    pub graph_len: usize,
    pub identity: &'a IdentityMap,
    pub vector_data: &'a HashMap<ContentId, VectorRecord>,
    pub dimension: usize,
    pub capacity: usize,
    pub created_at: u64,
}

/// Current UTC time in seconds since the Unix epoch.
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn calculate_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Writes every artifact of a store and commits with the manifest.
pub fn save_artifacts(paths: &ArtifactPaths, input: SaveInput<'_>) -> StoreResult<StoreManifest> {
    if let Some(parent) = paths.manifest.parent() {
        fs::create_dir_all(parent).map_err(|e| persistence_error("index directory", e))?;
    }

    let id_to_label = to_json(ID_TO_LABEL_ARTIFACT, &input.identity.id_to_label_sorted())?;
    let label_to_id = to_json(LABEL_TO_ID_ARTIFACT, &input.identity.label_to_id_sorted())?;
    let vector_data: BTreeMap<u64, &VectorRecord> = input
        .vector_data
        .iter()
        .map(|(id, record)| (id.value(), record))
        .collect();
    let vector_data = to_json(VECTOR_DATA_ARTIFACT, &vector_data)?;

    let artifacts: [(&str, &Path, &[u8]); 4] = [
        (GRAPH_ARTIFACT, &paths.graph, input.graph_bytes),
        (ID_TO_LABEL_ARTIFACT, &paths.id_to_label, &id_to_label),
        (LABEL_TO_ID_ARTIFACT, &paths.label_to_id, &label_to_id),
        (VECTOR_DATA_ARTIFACT, &paths.vector_data, &vector_data),
    ];

    let mut checksums = BTreeMap::new();
    for (artifact, path, bytes) in artifacts {
        write_atomic(artifact, path, bytes)?;
        checksums.insert(artifact.to_string(), calculate_checksum(bytes));
    }

    let manifest = StoreManifest {
        format_version: MANIFEST_FORMAT_VERSION,
        graph_format_version: GRAPH_FORMAT_VERSION,
        hash_scheme_version: HASH_SCHEME_VERSION,
        dimension: input.dimension,
        capacity: input.capacity,
        count: input.graph_len,
        mapped: input.identity.len(),
        created_at: input.created_at,
        updated_at: get_utc_timestamp(),
        checksums,
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| persistence_error("manifest", e))?;
    write_atomic("manifest", &paths.manifest, &manifest_bytes)?;

    debug!(
        "Saved store artifacts to {} ({} mapped of {} vectors)",
        paths.manifest.display(),
        manifest.mapped,
        manifest.count
    );
    Ok(manifest)
}

/// Reads the manifest, if one was committed.
pub fn read_manifest(paths: &ArtifactPaths) -> Result<Option<StoreManifest>, String> {
    if !paths.manifest.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&paths.manifest).map_err(|e| format!("cannot read manifest: {e}"))?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| format!("cannot parse manifest: {e}"))
}

/// Reads and validates the map artifacts against a graph of `graph_len`
/// elements and `dimension`-wide vectors.
///
/// Never fails: every problem is reported through the outcome.
pub fn load_maps(paths: &ArtifactPaths, graph_len: usize, dimension: usize) -> LoadOutcome {
    let manifest = match read_manifest(paths) {
        Ok(Some(manifest)) => manifest,
        Ok(None) => return LoadOutcome::Absent,
        Err(reason) => return LoadOutcome::Corrupt { reason },
    };

    match load_verified(paths, &manifest, graph_len, dimension) {
        Ok(maps) => LoadOutcome::Loaded(maps),
        Err(reason) => LoadOutcome::Corrupt { reason },
    }
}

/// Deletes every artifact of the store. Missing files are not an error.
pub fn remove_artifacts(paths: &ArtifactPaths) -> StoreResult<()> {
    for path in paths.all() {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(persistence_error(&path.display().to_string(), e)),
        }
    }
    Ok(())
}

fn load_verified(
    paths: &ArtifactPaths,
    manifest: &StoreManifest,
    graph_len: usize,
    dimension: usize,
) -> Result<PersistedMaps, String> {
    if manifest.format_version != MANIFEST_FORMAT_VERSION {
        return Err(format!(
            "manifest format version {} is not supported (expected {MANIFEST_FORMAT_VERSION})",
            manifest.format_version
        ));
    }
    if manifest.hash_scheme_version != HASH_SCHEME_VERSION {
        return Err(format!(
            "content ids were produced by hash scheme {} but this build uses {HASH_SCHEME_VERSION}",
            manifest.hash_scheme_version
        ));
    }
    if manifest.count != graph_len {
        return Err(format!(
            "manifest records {} elements but the graph holds {graph_len}",
            manifest.count
        ));
    }

    verify_checksum(manifest, GRAPH_ARTIFACT, &paths.graph)?;
    let id_to_label: BTreeMap<u64, usize> =
        read_verified_json(manifest, ID_TO_LABEL_ARTIFACT, &paths.id_to_label)?;
    let label_to_id: BTreeMap<usize, u64> =
        read_verified_json(manifest, LABEL_TO_ID_ARTIFACT, &paths.label_to_id)?;
    let vector_data: BTreeMap<u64, VectorRecord> =
        read_verified_json(manifest, VECTOR_DATA_ARTIFACT, &paths.vector_data)?;

    let identity = IdentityMap::from_parts(
        id_to_label
            .into_iter()
            .map(|(id, label)| (ContentId::new(id), Label::new(label)))
            .collect(),
        label_to_id
            .into_iter()
            .map(|(label, id)| (Label::new(label), ContentId::new(id)))
            .collect(),
    )
    .map_err(|e| format!("id/label maps are not a bijection: {e}"))?;

    if identity.len() != manifest.mapped {
        return Err(format!(
            "manifest records {} mapped ids but the maps hold {}",
            manifest.mapped,
            identity.len()
        ));
    }

    if let Some(max) = identity.max_label().filter(|max| max.value() >= graph_len) {
        return Err(format!(
            "label {max} points past the end of a graph with {graph_len} elements"
        ));
    }

    let mut records = HashMap::with_capacity(vector_data.len());
    for (key, record) in vector_data {
        if record.id.value() != key {
            return Err(format!("record stored under {key} carries id {}", record.id));
        }
        if !identity.contains_id(record.id) {
            return Err(format!("record {key} has no label"));
        }
        if record.vector.len() != dimension {
            return Err(format!(
                "record {key} has dimension {} but the store uses {dimension}",
                record.vector.len()
            ));
        }
        records.insert(record.id, record);
    }

    Ok(PersistedMaps {
        identity,
        vector_data: records,
        created_at: Some(manifest.created_at),
    })
}

fn verify_checksum(manifest: &StoreManifest, artifact: &str, path: &Path) -> Result<Vec<u8>, String> {
    let expected = manifest
        .checksums
        .get(artifact)
        .ok_or_else(|| format!("manifest has no checksum for {artifact}"))?;
    let bytes = fs::read(path).map_err(|e| format!("cannot read {artifact}: {e}"))?;
    let actual = calculate_checksum(&bytes);
    if &actual != expected {
        return Err(format!("checksum mismatch for {artifact}"));
    }
    Ok(bytes)
}

fn read_verified_json<T: serde::de::DeserializeOwned>(
    manifest: &StoreManifest,
    artifact: &str,
    path: &Path,
) -> Result<T, String> {
    let bytes = verify_checksum(manifest, artifact, path)?;
    serde_json::from_slice(&bytes).map_err(|e| format!("cannot parse {artifact}: {e}"))
}

fn to_json<T: Serialize>(artifact: &str, value: &T) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| persistence_error(artifact, e))
}

fn write_atomic(artifact: &str, path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp_path = temp_path_for(path);
    fs::write(&temp_path, bytes).map_err(|e| persistence_error(artifact, e))?;
    fs::rename(&temp_path, path).map_err(|e| persistence_error(artifact, e))
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn persistence_error(artifact: &str, error: impl std::fmt::Display) -> StoreError {
    StoreError::Persistence {
        artifact: artifact.to_string(),
        message: error.to_string(),
    }
}
