//! Persisted config (store directory, Ollama endpoint, chunking knobs) in the app data directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embed::DEFAULT_SUMMARIZE_THRESHOLD;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL};
use crate::retrieval::DEFAULT_TOP_K;

const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the per-course store files. Defaults to `<app data>/stores`.
    pub store_dir: Option<String>,
    pub ollama_url: String,
    pub embed_model: String,
    /// Model used to compress long chunks before embedding. No summarization when unset.
    pub summarize_model: Option<String>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks longer than this many characters are summarized before embedding.
    pub summarize_threshold: usize,
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            ollama_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            summarize_model: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            summarize_threshold: DEFAULT_SUMMARIZE_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Config {
    /// The configured store directory, falling back to the app data default.
    pub fn store_dir(&self) -> Option<PathBuf> {
        self.store_dir
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .or_else(app_data::default_store_dir)
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    match app_data::app_data_dir() {
        Some(dir) => load_config_from(&dir.join(CONFIG_FILENAME)),
        None => Config::default(),
    }
}

/// Load config from an explicit file. Returns default config if missing or invalid.
pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_default()
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

/// Save config to an explicit file.
pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the store directory. Creates it if needed.
pub fn set_store_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    std::fs::create_dir_all(path).map_err(ConfigError::CreateDir)?;
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.store_dir = Some(path.to_string_lossy().into_owned());
    save_config(&config)?;
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to create directory: {0}")]
    CreateDir(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}
