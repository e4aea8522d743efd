//! # Dossier CLI (`dossier`)
//!
//! The `dossier` binary is the primary interface for the engine. It
//! provides commands for document ingestion, question answering, an
//! interactive chat loop, and index inspection.
//!
//! ## Usage
//!
//! ```bash
//! dossier --config ./dossier.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dossier ingest [paths..]` | Index documents (fresh by default, `--append` to add) |
//! | `dossier query "<question>"` | Answer a question from the indexed documents |
//! | `dossier chat` | Interactive question loop on stdin |
//! | `dossier stats` | Collection overview (counts, size, sample files) |
//! | `dossier files` | List all indexed filenames |
//! | `dossier formats` | Supported document formats and their status |
//! | `dossier clear` | Delete the collection |
//!
//! ## Examples
//!
//! ```bash
//! # Fresh index of a folder
//! dossier ingest ./docs
//!
//! # Add more documents without discarding the index
//! dossier ingest ./contratti --append
//!
//! # Index the paths listed in a manifest file
//! dossier ingest --sources ./sources.txt
//!
//! # Ask a question with a wider context window
//! dossier query "Qual è la policy ferie?" --top-k 8
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use dossier::config::{self, Config};
use dossier::embedding::MistralClient;
use dossier::error::EngineError;
use dossier::extract::ExtractorRegistry;
use dossier::ingest::{run_ingest, IngestSource};
use dossier::models::{IngestReport, QueryResponse};
use dossier::progress::ProgressMode;
use dossier::query::run_query;
use dossier::stats::{collection_stats, list_indexed_files};
use dossier::store::{SqliteStore, VectorStore};

/// Dossier CLI — retrieval-augmented question answering over local
/// document collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing file means built-in defaults; the API key can also come
/// from the `MISTRAL_API_KEY` environment variable.
#[derive(Parser)]
#[command(
    name = "dossier",
    about = "Dossier — retrieval-augmented question answering over local documents",
    version,
    long_about = "Dossier ingests local documents (text, Office formats, PDF, HTML), chunks and \
    embeds them through the Mistral API, and answers questions by retrieving the nearest chunks \
    from a local SQLite vector index."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./dossier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Index documents into the vector store.
    ///
    /// By default every run rebuilds the collection from scratch; pass
    /// `--append` to add to the existing index instead. With no paths and
    /// no `--sources`, the folders from `[sources]` in the config are used.
    Ingest {
        /// Files or directories to index.
        paths: Vec<PathBuf>,

        /// Manifest file listing one path per line (blank lines and
        /// `#` comments ignored). Mutually exclusive with positional paths.
        #[arg(long)]
        sources: Option<PathBuf>,

        /// Keep existing vectors and append the new ones.
        #[arg(long)]
        append: bool,

        /// Progress output on stderr: auto (tty), off, human, or json.
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressArg,
    },

    /// Answer a question from the indexed documents.
    ///
    /// Prints the answer followed by the cited sources with similarity
    /// scores and previews.
    Query {
        /// The question to answer.
        question: String,

        /// Number of chunks to retrieve (default from config).
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Interactive question loop reading from stdin.
    ///
    /// Empty line or EOF exits.
    Chat,

    /// Show collection statistics.
    Stats,

    /// List all indexed filenames.
    Files,

    /// Show supported document formats and their status.
    Formats,

    /// Delete the collection and all its vectors.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(&self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            paths,
            sources,
            append,
            progress,
        } => {
            if sources.is_some() && !paths.is_empty() {
                bail!("give either positional paths or --sources, not both");
            }
            let source = match sources {
                Some(manifest) => IngestSource::Manifest(manifest),
                None if !paths.is_empty() => IngestSource::Paths(paths),
                None => {
                    if cfg.sources.folders.is_empty() {
                        bail!("no paths given and no [sources] folders configured");
                    }
                    IngestSource::Paths(cfg.sources.folders.clone())
                }
            };

            let embedder = MistralClient::from_config(&cfg)?;
            let store = open_store(&cfg).await?;
            let reporter = progress.mode().reporter();
            let report = run_ingest(&cfg, &embedder, &store, source, append, reporter.as_ref()).await?;
            print_ingest_report(&report);
            store.close().await;
        }

        Commands::Query { question, top_k } => {
            let client = MistralClient::from_config(&cfg)?;
            let store = open_store(&cfg).await?;
            let response = run_query(&cfg, &client, &client, &store, &question, top_k).await?;
            print_query_response(&response);
            store.close().await;
        }

        Commands::Chat => {
            let client = MistralClient::from_config(&cfg)?;
            let store = open_store(&cfg).await?;
            run_chat(&cfg, &client, &store).await?;
            store.close().await;
        }

        Commands::Stats => {
            let store = open_store(&cfg).await?;
            let stats = collection_stats(&cfg, &store).await?;
            println!("Collection:   {}", stats.collection);
            println!("Chunks:       {}", stats.total_chunks);
            println!("DB size:      {:.2} MB", stats.db_size_mb);
            if !stats.sample_files.is_empty() {
                println!("Sample files:");
                for name in &stats.sample_files {
                    println!("  {}", name);
                }
            }
            store.close().await;
        }

        Commands::Files => {
            let store = open_store(&cfg).await?;
            let files = list_indexed_files(&cfg, &store).await?;
            if files.is_empty() {
                println!("No files indexed.");
            } else {
                for name in &files {
                    println!("{}", name);
                }
                println!("\n{} files indexed.", files.len());
            }
            store.close().await;
        }

        Commands::Formats => {
            let registry = ExtractorRegistry::new();
            for row in registry.formats_status() {
                if row.available {
                    println!("{:<8} ok", row.extension);
                } else {
                    println!("{:<8} unavailable  ({})", row.extension, row.note);
                }
            }
        }

        Commands::Clear { yes } => {
            if !yes && !confirm(&format!("Delete collection '{}'?", cfg.store.collection))? {
                println!("Aborted.");
                return Ok(());
            }
            let store = open_store(&cfg).await?;
            store.delete_collection(&cfg.store.collection).await?;
            println!("Collection '{}' deleted.", cfg.store.collection);
            store.close().await;
        }
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&cfg.store.path)
        .await
        .with_context(|| format!("opening vector store at {}", cfg.store.path.display()))
}

fn print_ingest_report(report: &IngestReport) {
    if let Some(notice) = &report.notice {
        println!("{}", notice);
        return;
    }
    println!("Documents:      {}", report.documents);
    println!("Chunks:         {}", report.chunks);
    println!("Tokens (est.):  {}", report.tokens_est);
    println!("Cost (est.):    {:.6} EUR", report.cost_est);
    println!("Total indexed:  {}", report.total_indexed);
}

fn print_query_response(response: &QueryResponse) {
    println!("{}\n", response.answer);
    println!("Fonti:");
    for source in &response.sources {
        println!(
            "  {} (sezione {}, similarità {:.4})",
            source.filename, source.chunk_index, source.similarity
        );
        println!("    {}", source.preview);
    }
    println!(
        "\nToken: {} prompt + {} completion = {}",
        response.usage.prompt_tokens, response.usage.completion_tokens, response.usage.total_tokens
    );
}

async fn run_chat(
    cfg: &Config,
    client: &MistralClient,
    store: &dyn VectorStore,
) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        match run_query(cfg, client, client, store, question, None).await {
            Ok(response) => print_query_response(&response),
            Err(EngineError::EmptyIndex(collection)) => {
                println!(
                    "La collezione '{}' è vuota. Esegui prima 'dossier ingest'.",
                    collection
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
