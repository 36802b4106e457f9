//! CLI entry point for relata.
//!
//! Commands: init, config, index, related, reset and status. Every command
//! that touches the index loads settings, opens [`RelatedContent`] and
//! dispatches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde::Serialize;

use relata::corpus::document_path;
use relata::display::{
    THEME, create_failures_table, create_results_table, create_spinner, create_status_table,
    create_summary_table,
};
use relata::{
    Corpus, FastEmbedBackend, IndexError, MarkdownSegmenter, RelatedContent, SearchResult,
    Settings, logging,
};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic retrieval for markdown notes
#[derive(Parser)]
#[command(
    name = "relata",
    version = env!("CARGO_PKG_VERSION"),
    about = "Find related content across markdown notes",
    long_about = "Index markdown blocks as vectors and find content related to any line of a note.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ relata init\n  $ relata index notes\n  $ relata related notes/rust.md 12"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up .relata directory with default configuration
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Display active settings
    Config,

    /// Embed every document under a directory
    Index {
        /// Corpus root (defaults to the workspace root)
        path: Option<PathBuf>,

        /// Documents embedded at once (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find content related to a line of a document
    Related {
        /// Document inside the corpus
        file: PathBuf,

        /// 1-indexed line number
        line: u32,

        /// Corpus root the document path is relative to (defaults to the workspace root)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Maximum number of results (overrides config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the index
    Reset,

    /// Show index statistics
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct RelatedOutput<'a> {
    document: &'a str,
    line: u32,
    results: &'a [SearchResult],
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}", THEME.error_with_icon(&format!("{e:#}")));
        if let Some(index_error) = e.downcast_ref::<IndexError>() {
            for suggestion in index_error.recovery_suggestions() {
                eprintln!("  {}", THEME.apply(&THEME.dim, suggestion));
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    logging::init(cli.debug || settings.debug);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
            println!("Edit {} to customize your settings.", path.display());
            Ok(())
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Index {
            path,
            workers,
            json,
        } => index(settings, path, workers, json).await,
        Commands::Related {
            file,
            line,
            root,
            limit,
            json,
        } => related(&settings, &file, line, root, limit, json),
        Commands::Reset => {
            open(&settings)?.reset()?;
            println!("{}", THEME.success_with_icon("Index cleared"));
            Ok(())
        }
        Commands::Status { json } => {
            let status = open(&settings)?.status()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", create_status_table(&status));
            }
            Ok(())
        }
    }
}

fn load_settings(config: Option<&Path>) -> Result<Settings> {
    match config {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow!("Configuration error loading from {}: {e}", path.display())),
        None => Settings::load().map_err(|e| anyhow!("Configuration error: {e}")),
    }
}

fn open(settings: &Settings) -> Result<RelatedContent> {
    let backend = FastEmbedBackend::new(
        &settings.embedding.model,
        Settings::models_dir(),
        settings.embedding.show_download_progress,
    )
    .map_err(IndexError::from)?;

    Ok(RelatedContent::open(
        settings,
        Arc::new(backend),
        Arc::new(MarkdownSegmenter::new()),
    )?)
}

/// Corpus root: the explicit path, else the workspace root, else the
/// current directory.
fn corpus_root(settings: &Settings, explicit: Option<PathBuf>) -> Result<PathBuf> {
    let root = match explicit.or_else(|| settings.workspace_root.clone()) {
        Some(root) => root,
        None => std::env::current_dir().context("Cannot read the current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("Cannot resolve corpus root {}", root.display()))
}

async fn index(
    mut settings: Settings,
    path: Option<PathBuf>,
    workers: Option<usize>,
    json: bool,
) -> Result<()> {
    if let Some(workers) = workers {
        settings.embedding.workers = workers;
    }
    let root = corpus_root(&settings, path)?;
    let corpus = Corpus::discover(&root, &settings.corpus).map_err(IndexError::from)?;
    let service = open(&settings)?;

    let started = Instant::now();
    let spinner = (!json).then(|| {
        create_spinner(&format!(
            "Embedding {} documents from {}",
            corpus.len(),
            root.display()
        ))
    });
    let report = service.reindex_corpus(corpus).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = report?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", create_summary_table(&report, started.elapsed()));
    if report.is_complete() {
        println!("{}", THEME.success_with_icon("Index up to date"));
    } else {
        println!(
            "{}",
            THEME.warning_with_icon(&format!("{} documents failed", report.failures.len()))
        );
        println!("{}", create_failures_table(&report.failures));
    }
    Ok(())
}

fn related(
    settings: &Settings,
    file: &Path,
    line: u32,
    root: Option<PathBuf>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let root = corpus_root(settings, root)?;
    let file = file
        .canonicalize()
        .with_context(|| format!("Cannot resolve {}", file.display()))?;
    let document = document_path(&root, &file).ok_or_else(|| {
        anyhow!(
            "{} is not inside the corpus root {}",
            file.display(),
            root.display()
        )
    })?;

    let service = open(settings)?;
    let limit = limit.unwrap_or(settings.related.limit);
    let results = service.find_related_limited(&document, line, limit)?;

    if json {
        let output = RelatedOutput {
            document: &document,
            line,
            results: &results,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if results.is_empty() {
        println!(
            "{}",
            THEME.warning_with_icon(&format!("No related content for {document}:{line}"))
        );
    } else {
        println!("{}", create_results_table(&results));
    }
    Ok(())
}
