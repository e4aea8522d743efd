//! # Dossier
//!
//! A retrieval-augmented question answering engine for local document
//! collections.
//!
//! Dossier ingests documents from the filesystem (plain text, Office
//! formats, PDF, HTML), chunks and embeds them through the Mistral API,
//! and answers questions by retrieving the nearest chunks from a local
//! SQLite vector index and handing them to a chat model as grounded
//! context.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │   Loader    │──▶│   Pipeline   │──▶│  SQLite   │
//! │  FS/formats │   │ Chunk+Embed  │   │  vectors  │
//! └─────────────┘   └──────────────┘   └─────┬─────┘
//!                                            │
//!                       ┌────────────────────┤
//!                       ▼                    ▼
//!                 ┌───────────┐        ┌───────────┐
//!                 │   Query   │──────▶│  Mistral  │
//!                 │  retrieve │        │ chat API  │
//!                 └───────────┘        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dossier ingest ./docs             # index a folder (fresh)
//! dossier ingest ./more --append    # add to the existing index
//! dossier query "Qual è la policy ferie?"
//! dossier stats                     # index overview
//! dossier files                     # indexed filenames
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Engine error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-format text extraction |
//! | [`loader`] | Document discovery and loading |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Mistral embedding/chat clients |
//! | [`store`] | SQLite vector store and similarity search |
//! | [`progress`] | Ingest progress reporting |
//! | [`ingest`] | Ingest pipeline orchestration |
//! | [`query`] | Retrieval and answer generation |
//! | [`stats`] | Index inspection |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod progress;
pub mod query;
pub mod stats;
pub mod store;
