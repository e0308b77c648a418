use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

const DEFAULT_COLLECTION: &str = "seasonawards";
const DEFAULT_SAMPLE_LIMIT: usize = 3;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub db_path: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_sample_limit() -> usize {
    DEFAULT_SAMPLE_LIMIT
}

pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    Ok(config)
}
