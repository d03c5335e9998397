use crate::chat::Persona;
use crate::config::Config;
use crate::error::{Result, ValidationError, VersemapError};

/// Chat backends understood by `chat::backend_from_config`
pub const CHAT_BACKENDS: [&str; 3] = ["openai", "proxy", "ollama"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_assets(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_chat(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VersemapError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_assets(config: &Config, errors: &mut Vec<ValidationError>) {
        let assets = &config.assets;
        if assets.base.trim().is_empty() {
            errors.push(ValidationError::new(
                "assets.base",
                "Asset base URL or directory cannot be empty",
            ));
        }

        let required = [
            ("assets.verses_file", &assets.verses_file),
            ("assets.verse_embeddings_file", &assets.verse_embeddings_file),
            ("assets.passages_file", &assets.passages_file),
            ("assets.passage_embeddings_file", &assets.passage_embeddings_file),
        ];
        for (path, name) in required {
            if name.trim().is_empty() {
                errors.push(ValidationError::new(path, "File name cannot be empty"));
            }
        }

        if assets.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "assets.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() && config.embedding.model_dir.is_none() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty without a model_dir",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;
        if search.candidate_window == 0 {
            errors.push(ValidationError::new(
                "search.candidate_window",
                "Candidate window must be greater than 0",
            ));
        }

        if search.display_limit == 0 {
            errors.push(ValidationError::new(
                "search.display_limit",
                "Display limit must be greater than 0",
            ));
        }

        if search.display_limit > search.candidate_window {
            errors.push(ValidationError::new(
                "search.display_limit",
                format!(
                    "Display limit {} exceeds candidate window {}",
                    search.display_limit, search.candidate_window
                ),
            ));
        }

        if search.min_query_chars == 0 {
            errors.push(ValidationError::new(
                "search.min_query_chars",
                "Minimum query length must be at least 1",
            ));
        }
    }

    fn validate_chat(config: &Config, errors: &mut Vec<ValidationError>) {
        let chat = &config.chat;

        if !CHAT_BACKENDS.contains(&chat.backend.as_str()) {
            errors.push(ValidationError::new(
                "chat.backend",
                format!(
                    "Backend must be one of {:?}, got '{}'",
                    CHAT_BACKENDS, chat.backend
                ),
            ));
        }

        let endpoint = chat.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            errors.push(ValidationError::new(
                "chat.endpoint",
                format!("Endpoint must be an http(s) URL, got '{}'", chat.endpoint),
            ));
        }

        if !(0.0..=2.0).contains(&chat.temperature) {
            errors.push(ValidationError::new(
                "chat.temperature",
                format!(
                    "Temperature must be between 0.0 and 2.0, got {}",
                    chat.temperature
                ),
            ));
        }

        if chat.persona.parse::<Persona>().is_err() {
            errors.push(ValidationError::new(
                "chat.persona",
                format!("Unknown persona '{}'", chat.persona),
            ));
        }
    }
}
