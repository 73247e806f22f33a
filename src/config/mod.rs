//! Configuration management for vidsearch
//!
//! Loads the TOML configuration, applies profile and environment overrides,
//! and validates the result before any component is constructed.

use crate::error::{Result, VidSearchError};
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
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub agents: AgentsConfig,
    #[serde(default)]
    pub text: TextSearchConfig,
    #[serde(default)]
    pub visual: VisualSearchConfig,
    #[serde(default)]
    pub temporal: TemporalSearchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
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

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding the videos / keyframes / objects tables
    pub database_path: PathBuf,
    /// Directory holding vector collection snapshots
    pub vector_dir: PathBuf,
}

impl StorageConfig {
    pub fn keyframe_snapshot(&self) -> PathBuf {
        self.vector_dir.join("keyframes.vec.zst")
    }

    pub fn keyword_snapshot(&self) -> PathBuf {
        self.vector_dir.join("keywords.vec.zst")
    }
}

/// External classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub timeout_secs: u64,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Text encoder sharing the keyframe CLIP space
    pub visual_model: String,
    /// Encoder used for keyword expansion
    pub keyword_model: String,
}

/// Vector collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub visual_dim: usize,
    pub keyword_dim: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

/// Settings shared by every retrieval executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Deadline for a single executor run
    pub timeout_secs: u64,
    /// Top-K cap for text, visual and fused result lists
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextSearchConfig {
    pub keyword_expansion: bool,
    pub expansion_limit: usize,
    pub expansion_threshold: f32,
}

impl Default for TextSearchConfig {
    fn default() -> Self {
        Self {
            keyword_expansion: true,
            expansion_limit: 10,
            expansion_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualSearchConfig {
    /// Minimum cosine similarity returned by the keyframe collection
    pub similarity_floor: f32,
    /// Keyframes kept per video when the diversity filter is on
    pub max_per_video: usize,
}

impl Default for VisualSearchConfig {
    fn default() -> Self {
        Self {
            similarity_floor: 0.05,
            max_per_video: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalSearchConfig {
    pub max_results: usize,
}

impl Default for TemporalSearchConfig {
    fn default() -> Self {
        Self { max_results: 100 }
    }
}

/// Per-executor result cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            ttl_secs: 3600,
        }
    }
}

/// In-memory search history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VidSearchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| VidSearchError::Io {
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
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| VidSearchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| VidSearchError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = enabled;
        }
        if let Some(timeout) = overrides.agent_timeout_secs {
            self.agents.timeout_secs = timeout;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: VIDSEARCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("VIDSEARCH_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "LLM__BASE_URL" => {
                self.llm.base_url = value.to_string();
            }
            "STORAGE__DATABASE_PATH" => {
                self.storage.database_path = PathBuf::from(value);
            }
            "STORAGE__VECTOR_DIR" => {
                self.storage.vector_dir = PathBuf::from(value);
            }
            "AGENTS__TIMEOUT_SECS" => {
                self.agents.timeout_secs = parse_env(path, value)?;
            }
            "CACHE__ENABLED" => {
                self.cache.enabled = parse_env(path, value)?;
            }
            "TEXT__KEYWORD_EXPANSION" => {
                self.text.keyword_expansion = parse_env(path, value)?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            VidSearchError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("vidsearch").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| VidSearchError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".vidsearch"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| VidSearchError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.vidsearch");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                database_path: data_dir.join("metadata_keyframe_object.db"),
                vector_dir: data_dir.join("vectors"),
            },
            llm: LlmConfig {
                provider: "gemini".to_string(),
                api_key_env: "GOOGLE_API_KEY".to_string(),
                model: "gemini-2.5-flash".to_string(),
                temperature: 0.1,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                timeout_secs: 30,
            },
            embedding: EmbeddingConfig {
                visual_model: "clip-vit-b-32".to_string(),
                keyword_model: "paraphrase-multilingual-minilm-l12-v2".to_string(),
            },
            indexing: IndexingConfig {
                visual_dim: 512,
                keyword_dim: 384,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            agents: AgentsConfig {
                timeout_secs: 30,
                max_results: 50,
            },
            text: TextSearchConfig::default(),
            visual: VisualSearchConfig::default(),
            temporal: TemporalSearchConfig::default(),
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
            profiles: HashMap::new(),
        }
    }
}
