//! Finding the documents that make up a corpus.
//!
//! Discovery walks a directory with the `ignore` crate, so `.gitignore`,
//! `.relataignore` and the configured ignore patterns all apply. Document
//! paths are relative to the corpus root with `/` separators, which keeps
//! content ids identical across machines and checkouts.

use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{CorpusConfig, IGNORE_FILE};
use crate::embedding::DocumentFailure;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus root {0} is not a directory\nSuggestion: Pass the directory that holds your documents")]
    NotADirectory(PathBuf),

    #[error("Invalid ignore pattern '{pattern}': {source}\nSuggestion: Fix corpus.ignore_patterns in settings (gitignore syntax)")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
}

/// One document of the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the corpus root, `/`-separated
    pub path: String,
    pub content: String,
}

/// Documents found under a root, sorted by path.
#[derive(Debug, Default)]
pub struct Corpus {
    pub root: PathBuf,
    pub documents: Vec<Document>,
    /// Files that matched but could not be read as UTF-8 text
    pub failures: Vec<DocumentFailure>,
}

impl Corpus {
    pub fn discover(root: &Path, config: &CorpusConfig) -> Result<Self, CorpusError> {
        if !root.is_dir() {
            return Err(CorpusError::NotADirectory(root.to_path_buf()));
        }

        let mut overrides = OverrideBuilder::new(root);
        for pattern in &config.ignore_patterns {
            // A leading '!' turns an override glob into an ignore rule
            overrides
                .add(&format!("!{pattern}"))
                .map_err(|source| CorpusError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
        }
        let overrides = overrides
            .build()
            .map_err(|source| CorpusError::InvalidPattern {
                pattern: config.ignore_patterns.join(", "),
                source,
            })?;

        let mut builder = WalkBuilder::new(root);
        builder
            .hidden(!config.include_hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .follow_links(false)
            .require_git(false)
            .overrides(overrides);
        builder.add_custom_ignore_filename(IGNORE_FILE);

        let mut corpus = Corpus {
            root: root.to_path_buf(),
            ..Corpus::default()
        };

        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            let file = entry.path();
            if !has_extension(file, &config.extensions) {
                continue;
            }
            let Some(path) = document_path(root, file) else {
                continue;
            };

            match std::fs::read_to_string(file) {
                Ok(content) => corpus.documents.push(Document { path, content }),
                Err(e) => {
                    warn!("Cannot read {}: {e}", file.display());
                    corpus.failures.push(DocumentFailure {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        corpus.documents.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            "Discovered {} documents under {}",
            corpus.documents.len(),
            root.display()
        );
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Path of `file` relative to `root`, `/`-separated.
///
/// Returns `None` when `file` is not under `root` or is not valid UTF-8.
pub fn document_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn has_extension(file: &Path, extensions: &[String]) -> bool {
    file.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}
