use std::path::PathBuf;
use thiserror::Error;

use crate::assets::AssetError;
use crate::chat::ChatError;
use crate::embedding::EmbeddingError;

/// Main error type for versemap
#[derive(Error, Debug)]
pub enum VersemapError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Fetching or decoding a search asset failed
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Query encoding failed
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// The query encoder could not be brought up
    #[error("Search unavailable: {0}")]
    EncoderUnavailable(String),

    /// Chat backend errors
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for versemap operations
pub type Result<T> = std::result::Result<T, VersemapError>;
