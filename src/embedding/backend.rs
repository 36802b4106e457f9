//! Embedding backends.
//!
//! The pipeline talks to a backend through [`EmbeddingBackend`]: one text in,
//! one vector out. [`FastEmbedBackend`] runs a local fastembed model; tests
//! plug in deterministic backends of their own.

use std::path::PathBuf;
use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::embedding::EmbeddingError;

/// Output of one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// Turns text into vectors.
///
/// Implementations must be thread-safe: the pipeline calls `embed` from
/// several blocking workers at once.
pub trait EmbeddingBackend: Send + Sync {
    /// Embeds a single text.
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    /// Length of every vector this backend produces.
    fn dimension(&self) -> usize;

    /// Human-readable model identifier.
    fn model_name(&self) -> &str;
}

/// Local embedding model served by fastembed.
///
/// Calls are serialized on the model mutex; one slow call delays every call
/// queued behind it.
pub struct FastEmbedBackend {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedBackend")
            .field("model", &"<TextEmbedding>")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedBackend {
    /// Loads `model_name` from `cache_dir`, downloading it on first use.
    ///
    /// The dimension is measured from a sample embedding rather than trusted
    /// from a table.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        show_download_progress: bool,
    ) -> Result<Self, EmbeddingError> {
        let model = parse_embedding_model(model_name)?;

        let has_cached_models = cache_dir.exists()
            && cache_dir
                .read_dir()
                .is_ok_and(|mut entries| entries.any(|_| true));
        if has_cached_models {
            info!("Loading embedding model {model_name} from cache");
        } else {
            info!("Downloading embedding model {model_name} (first time only)");
        }

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        let sample = text_model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::ModelInit(format!("sample embedding failed: {e}")))?;
        let dimension = sample
            .into_iter()
            .next()
            .map(|v| v.len())
            .filter(|&len| len > 0)
            .ok_or(EmbeddingError::EmptyEmbedding)?;

        Ok(Self {
            model: Mutex::new(text_model),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingBackend for FastEmbedBackend {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                EmbeddingError::Backend(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::Backend(format!("Failed to generate embedding: {e}")))?;

        let vector = embeddings
            .into_iter()
            .next()
            .ok_or(EmbeddingError::EmptyEmbedding)?;

        Ok(Embedding {
            vector,
            token_count: estimate_tokens(text),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Maps a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "ParaphraseMLMiniLML12V2" => Ok(EmbeddingModel::ParaphraseMLMiniLML12V2),
        other => Err(EmbeddingError::ModelInit(format!(
            "unknown model '{other}' (supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small, ParaphraseMLMiniLML12V2)"
        ))),
    }
}

/// Rough token count: whitespace-separated words.
pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}
