// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Override for the memory database location. Defaults to the data dir.
    pub db_path: Option<String>,
    /// Dimensionality of the placeholder vector stored with every record.
    pub vector_dimensions: usize,
    /// Default result cap for memory searches issued by the dashboard surface.
    pub search_limit: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            vector_dimensions: 1536,
            search_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider tried first by the resilience layer: "openai" or "ondevice".
    pub default_provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub memory_enabled: bool,
    /// How many retrieved records are injected into the prompt at most.
    pub max_memory_context: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_provider: "openai".into(),
            model: "gpt-4o-2024-11-20".into(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_seconds: 30,
            memory_enabled: true,
            max_memory_context: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    /// Optional bearer token required on every API request when set.
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 7171,
            token: None,
        }
    }
}

impl Config {
    /// Load config from the default location, falling back to defaults
    /// when no config.toml exists yet.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
