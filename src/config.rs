//! Configuration module for the block retrieval system.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `RELATA_` and use double underscores
//! to separate nested levels:
//! - `RELATA_STORE__CAPACITY=50000` sets `store.capacity`
//! - `RELATA_EMBEDDING__WORKERS=2` sets `embedding.workers`
//! - `RELATA_RELATED__LIMIT=5` sets `related.limit`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::StoreOptions;

/// Name of the per-workspace configuration directory.
pub const CONFIG_DIR: &str = ".relata";

/// Ignore file honored by corpus discovery, in gitignore syntax.
pub const IGNORE_FILE: &str = ".relataignore";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Workspace root directory (where .relata is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Vector store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding backend and pipeline settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Which files make up the corpus
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Related-content query settings
    #[serde(default)]
    pub related: RelatedConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Base name of the persisted artifacts
    #[serde(default = "default_store_name")]
    pub name: String,

    /// Vector dimension; must match the embedding model
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum number of vectors the graph accepts
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Candidate list size while searching
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    /// Candidate list size while building the graph
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    /// Fail instead of starting from empty maps when persisted maps are corrupt
    #[serde(default = "default_false")]
    pub strict_load: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Per-call timeout for the embedding backend, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Documents embedded concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Show a progress bar while the model downloads
    #[serde(default = "default_true")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CorpusConfig {
    /// File extensions (without the dot) that are indexed
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Patterns to ignore during discovery (gitignore syntax)
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Descend into hidden files and directories
    #[serde(default = "default_false")]
    pub include_hidden: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RelatedConfig {
    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Leave the blocks under the queried line out of the results
    #[serde(default = "default_true")]
    pub exclude_source_blocks: bool,

    /// Minimum score for a result to be reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".relata/index")
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_store_name() -> String {
    "saved_index".to_string()
}
fn default_dimension() -> usize {
    crate::vector::VECTOR_DIMENSION_384
}
fn default_capacity() -> usize {
    10_000
}
fn default_ef_search() -> usize {
    32
}
fn default_ef_construction() -> usize {
    150
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_workers() -> usize {
    num_cpus::get().max(1)
}
fn default_extensions() -> Vec<String> {
    vec!["md".to_string()]
}
fn default_limit() -> usize {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            workspace_root: None,
            debug: false,
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            corpus: CorpusConfig::default(),
            related: RelatedConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            dimension: default_dimension(),
            capacity: default_capacity(),
            ef_search: default_ef_search(),
            ef_construction: default_ef_construction(),
            strict_load: false,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            timeout_ms: default_timeout_ms(),
            workers: default_workers(),
            show_download_progress: true,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_patterns: vec![
                ".git/**".to_string(),
                "node_modules/**".to_string(),
                ".relata/**".to_string(),
            ],
            include_hidden: false,
        }
    }
}

impl Default for RelatedConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            exclude_source_blocks: true,
            threshold: None,
        }
    }
}

impl StoreConfig {
    /// Graph tunables handed to the vector store.
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            ef_search: self.ef_search,
            ef_construction: self.ef_construction,
            strict_load: self.strict_load,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Worker count, never below one.
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .relata directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                // If workspace_root is not set in config, detect it
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels; single underscores stay in field names
            .merge(Env::prefixed("RELATA_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the workspace root by looking for .relata directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Get the workspace root directory (where .relata is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Index directory resolved against the workspace root.
    pub fn resolved_index_path(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.index_path.is_relative() => root.join(&self.index_path),
            _ => self.index_path.clone(),
        }
    }

    /// Where embedding models are cached.
    pub fn models_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR).join("models"))
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("models"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&config_path, Self::template())?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Self::create_default_ignore_file(force)?;

        Ok(config_path)
    }

    fn template() -> String {
        format!(
            r#"# Relata Configuration File

# Version of the configuration schema
version = 1

# Path to the index directory (relative to workspace root)
index_path = ".relata/index"

# Global debug mode
debug = false

[store]
# Base name of the persisted index files
name = "saved_index"

# Vector dimension, must match the embedding model (AllMiniLML6V2 = 384)
dimension = 384

# Maximum number of blocks the index holds. Changing it requires 'relata reset'
capacity = 10000

# Search quality knobs: higher is more accurate and slower
ef_search = 32
ef_construction = 150

# Refuse to start when persisted maps fail validation
# (default: warn and continue with empty maps)
strict_load = false

[embedding]
# Model to use for embeddings
model = "AllMiniLML6V2"

# Timeout for a single embedding call, in milliseconds
timeout_ms = 30000

# Documents embedded concurrently (defaults to CPU count)
# workers = {}

show_download_progress = true

[corpus]
# File extensions to index
extensions = ["md"]

# Additional patterns to ignore (gitignore syntax)
ignore_patterns = [".git/**", "node_modules/**", ".relata/**"]

include_hidden = false

[related]
# Maximum number of related blocks returned
limit = 10

# Leave the blocks under the queried line out of the results
exclude_source_blocks = true

# Minimum similarity score (-1.0 to 1.0)
# threshold = 0.4
"#,
            num_cpus::get()
        )
    }

    /// Create a default ignore file with helpful patterns
    fn create_default_ignore_file(force: bool) -> Result<(), Box<dyn std::error::Error>> {
        let ignore_path = PathBuf::from(IGNORE_FILE);

        if !force && ignore_path.exists() {
            println!("Found existing {IGNORE_FILE} file");
            return Ok(());
        }

        let default_content = r#"# Relata ignore patterns (gitignore syntax)
# https://git-scm.com/docs/gitignore

# Relata's own directory
.relata/

# Drafts and scratch notes
drafts/
*.tmp.md

# Templates usually repeat the same blocks everywhere
templates/

# Example of including a specific file from an ignored directory:
# !drafts/keep.md
"#;

        std::fs::write(&ignore_path, default_content)?;

        if force {
            println!("Overwrote {IGNORE_FILE} file");
        } else {
            println!("Created default {IGNORE_FILE} file");
        }

        Ok(())
    }
}
