//! TOML configuration for the Dossier engine.
//!
//! Every section has serde defaults, so a missing config file falls back
//! to `Config::default()` and a partial file only needs the keys it
//! overrides. Validation happens once in [`load_config`]; in particular
//! `chunking.overlap >= chunking.size` is rejected there instead of
//! letting the chunker loop without advancing.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default system instruction handed to the generation capability.
/// Answers must come only from the supplied context, in Italian, with
/// filenames cited and an explicit statement when the context is silent.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Sei Dossier, un assistente AI aziendale.
Rispondi alle domande basandoti ESCLUSIVAMENTE sul contesto fornito dai documenti aziendali.

Regole:
- Rispondi in italiano
- Se l'informazione non è nel contesto, dillo chiaramente
- Cita la fonte (nome file) quando possibile
- Sii preciso e conciso";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub chat: ChatConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    /// API key; when empty the `MISTRAL_API_KEY` environment variable is used.
    pub key: String,
    /// Base URL of the remote API. Overridable for tests.
    pub base_url: String,
    pub embed_model: String,
    pub chat_model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            base_url: "https://api.mistral.ai".to_string(),
            embed_model: "mistral-embed".to_string(),
            chat_model: "mistral-small-latest".to_string(),
        }
    }
}

impl ApiConfig {
    /// Resolve the credential: saved key first, then the environment.
    pub fn resolve_key(&self) -> Option<String> {
        if !self.key.trim().is_empty() {
            return Some(self.key.trim().to_string());
        }
        std::env::var("MISTRAL_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Sampling temperature; kept low for reproducible grounded answers.
    pub temperature: f64,
    /// Output-length ceiling for one answer.
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Texts per remote embedding call.
    pub batch_size: usize,
    /// Retries for 429/5xx responses. 0 = fail on first error.
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 0,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file backing the vector index.
    pub path: PathBuf,
    /// Logical collection name inside the store.
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./dossier_db/vectors.sqlite"),
            collection: "dossier_docs".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters.
    pub size: usize,
    /// Overlap carried into the next window. Must be < size.
    pub overlap: usize,
    /// Fragments of this length or shorter are dropped as noise.
    pub min_chunk_len: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
            min_chunk_len: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Folders to ingest when the CLI is given no explicit paths.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SourcesConfig {
    pub folders: Vec<PathBuf>,
}

/// Load and validate configuration.
///
/// A missing file is not an error: defaults apply, matching the zero-conf
/// CLI flow. A present-but-invalid file always fails.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.size == 0 {
        anyhow::bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        anyhow::bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }
    if config.chunking.min_chunk_len >= config.chunking.size {
        anyhow::bail!("chunking.min_chunk_len must be smaller than chunking.size");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    if !(0.0..=2.0).contains(&config.chat.temperature) {
        anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
    }
    if config.store.collection.trim().is_empty() {
        anyhow::bail!("store.collection must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.chunking.size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/dossier.toml")).unwrap();
        assert_eq!(config.api.embed_model, "mistral-embed");
    }

    #[test]
    fn overlap_ge_size_is_rejected() {
        let mut config = Config::default();
        config.chunking.size = 100;
        config.chunking.overlap = 100;
        assert!(validate(&config).is_err());
        config.chunking.overlap = 150;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "[chunking]\nsize = 800\n\n[retrieval]\ntop_k = 3\n"
        )
        .unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.chunking.size, 800);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 3);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[chunking]\nsize = 100\noverlap = 500\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    #[test]
    fn saved_key_takes_priority_over_env() {
        let api = ApiConfig {
            key: "sk-saved".to_string(),
            ..Default::default()
        };
        assert_eq!(api.resolve_key().as_deref(), Some("sk-saved"));
    }
}
