//! Configuration management for versemap
//!
//! Loads the TOML config, applies `VERSEMAP_SECTION__KEY` environment
//! overrides and named profiles, then validates the result.

use crate::corpus::Translation;
use crate::error::{Result, VersemapError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub assets: AssetsConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub chat: ChatConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where the search bundle lives and what its files are called
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Base URL (`http(s)://...`) or local directory
    pub base: String,
    pub timeout_secs: u64,
    pub verses_file: String,
    /// Alternate translation text; omit to skip it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternates_file: Option<String>,
    pub verse_embeddings_file: String,
    pub passages_file: String,
    pub passage_embeddings_file: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            base: "~/.local/share/versemap".to_string(),
            timeout_secs: 60,
            verses_file: "sphere.json".to_string(),
            alternates_file: Some("bsb_verses.json".to_string()),
            verse_embeddings_file: "search_embeddings.bin".to_string(),
            passages_file: "passages.json".to_string(),
            passage_embeddings_file: "passage_embeddings.bin".to_string(),
        }
    }
}

/// Query encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Local ONNX export used instead of a built-in model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
    pub dimension: usize,
}

/// Ranking and display limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub candidate_window: usize,
    pub display_limit: usize,
    pub min_query_chars: usize,
    #[serde(default)]
    pub translation: Translation,
}

/// Chat backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub backend: String,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub persona: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<Translation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_endpoint: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VersemapError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| VersemapError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VersemapError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| VersemapError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| VersemapError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(translation) = overrides.translation {
            self.search.translation = translation;
        }
        if let Some(backend) = overrides.chat_backend {
            self.chat.backend = backend;
        }
        if let Some(endpoint) = overrides.chat_endpoint {
            self.chat.endpoint = endpoint;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: VERSEMAP_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("VERSEMAP_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "ASSETS__BASE" => self.assets.base = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__MODEL_DIR" => self.embedding.model_dir = Some(PathBuf::from(value)),
            "SEARCH__TRANSLATION" => {
                self.search.translation =
                    value
                        .parse()
                        .map_err(|message| VersemapError::InvalidConfigValue {
                            path: path.to_string(),
                            message,
                        })?;
            }
            "SEARCH__DISPLAY_LIMIT" => {
                self.search.display_limit = parse_number(path, value)?;
            }
            "SEARCH__CANDIDATE_WINDOW" => {
                self.search.candidate_window = parse_number(path, value)?;
            }
            "CHAT__BACKEND" => self.chat.backend = value.to_string(),
            "CHAT__ENDPOINT" => self.chat.endpoint = value.to_string(),
            "CHAT__MODEL" => self.chat.model = value.to_string(),
            "CHAT__PERSONA" => self.chat.persona = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            VersemapError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("versemap").join("config.toml"))
    }

    /// Load from the default path, or fall back to defaults when absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        match Self::load(&path) {
            Err(VersemapError::ConfigNotFound { .. }) => {
                tracing::debug!("No config at {:?}, using defaults", path);
                let mut config = Self::default();
                config.apply_env_overrides();
                ConfigValidator::validate(&config)?;
                Ok(config)
            }
            other => other,
        }
    }
}

fn parse_number(path: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| VersemapError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}' as a number", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            assets: AssetsConfig::default(),
            embedding: EmbeddingConfig {
                model: "bge-base-en-v1.5".to_string(),
                model_dir: None,
                dimension: crate::embedding::DEFAULT_DIMENSION,
            },
            search: SearchConfig {
                candidate_window: crate::retrieval::DEFAULT_CANDIDATE_WINDOW,
                display_limit: crate::retrieval::DEFAULT_DISPLAY_LIMIT,
                min_query_chars: 1,
                translation: Translation::Kjv,
            },
            chat: ChatConfig {
                backend: "ollama".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2:3b".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                temperature: 0.7,
                timeout_secs: 120,
                persona: "standard".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}
