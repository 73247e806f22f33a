use crate::config::Config;
use crate::error::{Result, ValidationError, VidSearchError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_agents(config, &mut errors);
        Self::validate_cache(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(VidSearchError::ConfigValidation { errors })
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

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked when the store is opened; paths may contain ~
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }

        if config.storage.vector_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.vector_dir",
                "Vector directory cannot be empty",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["gemini"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }

        if !config.llm.base_url.starts_with("http://") && !config.llm.base_url.starts_with("https://")
        {
            errors.push(ValidationError::new(
                "llm.base_url",
                format!("Base URL must be http(s), got '{}'", config.llm.base_url),
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.visual_model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.visual_model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.keyword_model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.keyword_model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.visual_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.visual_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.keyword_dim == 0 {
            errors.push(ValidationError::new(
                "indexing.keyword_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if config.indexing.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.indexing.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "indexing.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }
    }

    fn validate_agents(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.agents.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "agents.timeout_secs",
                "Executor timeout must be greater than 0",
            ));
        }

        if config.agents.max_results == 0 {
            errors.push(ValidationError::new(
                "agents.max_results",
                "Result cap must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&config.text.expansion_threshold) {
            errors.push(ValidationError::new(
                "text.expansion_threshold",
                "Threshold must be between 0.0 and 1.0",
            ));
        }

        if !(-1.0..=1.0).contains(&config.visual.similarity_floor) {
            errors.push(ValidationError::new(
                "visual.similarity_floor",
                "Cosine similarity floor must be between -1.0 and 1.0",
            ));
        }

        if config.visual.max_per_video == 0 {
            errors.push(ValidationError::new(
                "visual.max_per_video",
                "Per-video cap must be greater than 0",
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.enabled && config.cache.max_entries == 0 {
            errors.push(ValidationError::new(
                "cache.max_entries",
                "An enabled cache needs at least one entry",
            ));
        }
    }
}
