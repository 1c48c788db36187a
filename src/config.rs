//! TOML configuration.
//!
//! A single [`Config`] is built once at process start (from a file or from
//! [`Config::default`]) and passed by reference to everything that needs it.
//!
//! ```toml
//! [paths]
//! index_dir = "igris_memory.index"
//! chunk_store = "igris_docs.json"
//! memory_file = "igris_chat_memory.json"
//!
//! [chunking]
//! chunk_chars = 800
//! overlap_chars = 120
//!
//! [embedding]
//! provider = "hash"
//! dims = 384
//!
//! [publish]
//! prefix = "igris"
//! region = "us-east-1"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_chunk_store")]
    pub chunk_store: PathBuf,
    #[serde(default = "default_memory_file")]
    pub memory_file: PathBuf,
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            chunk_store: default_chunk_store(),
            memory_file: default_memory_file(),
            documents_dir: default_documents_dir(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("igris_memory.index")
}
fn default_chunk_store() -> PathBuf {
    PathBuf::from("igris_docs.json")
}
fn default_memory_file() -> PathBuf {
    PathBuf::from("igris_chat_memory.json")
}
fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    800
}
fn default_overlap_chars() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            region: default_region(),
            endpoint_url: None,
        }
    }
}

fn default_prefix() -> String {
    "igris".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_chars == 0 {
            anyhow::bail!("chunking.chunk_chars must be > 0");
        }
        if self.chunking.overlap_chars >= self.chunking.chunk_chars {
            anyhow::bail!(
                "chunking.overlap_chars ({}) must be smaller than chunking.chunk_chars ({})",
                self.chunking.overlap_chars,
                self.chunking.chunk_chars
            );
        }

        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }
        match self.embedding.provider.as_str() {
            "hash" => {}
            "openai" => {
                if self.embedding.model.is_none() {
                    anyhow::bail!("embedding.model must be specified when provider is 'openai'");
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be hash or openai.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}
