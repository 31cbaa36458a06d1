//! Configuration for the test case knowledge base.
//!
//! Layered configuration, later layers win:
//! - Default values
//! - TOML configuration file (`.casebase/settings.toml`, searched upward from
//!   the current directory, or an explicit `--config` path)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CB_` and use double underscores
//! to separate nested levels:
//! - `CB_DECISION__SAME_THRESHOLD=0.9` sets `decision.same_threshold`
//! - `CB_ORCHESTRATOR__WORKERS=8` sets `orchestrator.workers`
//! - `CB_EMBEDDING__PROVIDER=hashed` sets `embedding.provider`
//!
//! Settings are checked by [`Settings::validate`] before anything runs, so an
//! out-of-range threshold stops the program at startup instead of mid-batch.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::llm::AuthScheme;
use crate::merge::MergeStrategy;
use crate::vector::DistanceMetric;

/// Directory holding settings and (by default) data.
pub const CONFIG_DIR: &str = ".casebase";
const SETTINGS_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "CB_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration file already exists at {0}. Use --force to overwrite")]
    AlreadyExists(PathBuf),

    #[error("Failed to write configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub decision: DecisionConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Root for suite records and vector collections
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbeddingConfig {
    /// `openai` (OpenAI-compatible HTTP), `fastembed` (local model) or `hashed` (offline)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Base URL of the embeddings endpoint
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    /// Remote model name, or fastembed model name for the local provider
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Input is truncated to this many characters before embedding
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Maximum texts per upstream request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Requested vector size (sent to the service; used by the hashed provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Base URL of the chat completions endpoint
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,

    /// Model or deployment name
    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// `bearer` or `api-key` (Azure)
    #[serde(default = "default_auth")]
    pub auth: String,

    /// Appended as `api-version` query parameter when set (Azure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Overrides the per-call temperature of every request when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Upper bound on output tokens for every request when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Phrase decision rationales with the model instead of the template
    #[serde(default = "default_true")]
    pub explain: bool,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DecisionConfig {
    /// Fused score at or above which a candidate can be SAME
    #[serde(default = "default_same_threshold")]
    pub same_threshold: f32,

    /// Fused score below which a candidate is always NEW
    #[serde(default = "default_addon_min_threshold")]
    pub addon_min_threshold: f32,

    /// How far embedding similarity may sit below `same_threshold` for SAME
    #[serde(default = "default_same_tolerance")]
    pub same_tolerance: f32,

    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f32,

    #[serde(default = "default_analysis_weight")]
    pub analysis_weight: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Neighbors fetched per candidate
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Native metric of new vector collections
    #[serde(default)]
    pub metric: DistanceMetric,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Concurrent reconciliation units (clamped to 1..=10)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Time allowed for one candidate's analysis
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MergeConfig {
    #[serde(default)]
    pub strategy: MergeStrategy,
}

/// Logging configuration.
///
/// Controls log verbosity globally and per-module.
/// `RUST_LOG` environment variable takes precedence when set.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `orchestrator = "info"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_data_dir() -> PathBuf { PathBuf::from(CONFIG_DIR).join("data") }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_openai_endpoint() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_generation_model() -> String { "gpt-4o-mini".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_auth() -> String { "bearer".to_string() }
fn default_max_chars() -> usize { 8000 }
fn default_batch_size() -> usize { 16 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_generation_timeout() -> u64 { 60 }
fn default_same_threshold() -> f32 { 0.85 }
fn default_addon_min_threshold() -> f32 { 0.60 }
fn default_same_tolerance() -> f32 { 0.05 }
fn default_embedding_weight() -> f32 { 0.6 }
fn default_analysis_weight() -> f32 { 0.4 }
fn default_top_k() -> usize { 10 }
fn default_workers() -> usize { num_cpus::get().clamp(1, 4) }
fn default_unit_timeout() -> u64 { 120 }
fn default_log_level() -> String { "warn".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            decision: DecisionConfig::default(),
            retrieval: RetrievalConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            merge: MergeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: default_openai_endpoint(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            max_chars: default_max_chars(),
            batch_size: default_batch_size(),
            dimensions: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_openai_endpoint(),
            model: default_generation_model(),
            api_key_env: default_api_key_env(),
            auth: default_auth(),
            api_version: None,
            temperature: None,
            max_tokens: None,
            explain: true,
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            same_threshold: default_same_threshold(),
            addon_min_threshold: default_addon_min_threshold(),
            same_tolerance: default_same_tolerance(),
            embedding_weight: default_embedding_weight(),
            analysis_weight: default_analysis_weight(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: DistanceMetric::default(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            unit_timeout_secs: default_unit_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl StorageConfig {
    pub fn suites_dir(&self) -> PathBuf {
        self.data_dir.join("suites")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }
}

impl Settings {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        // Try to find the workspace root by looking for .casebase directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(SETTINGS_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file (missing file means defaults).
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting; single underscores stay in field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)?;
        Ok(settings)
    }

    /// Find `.casebase/settings.toml` from the current directory up to root.
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(SETTINGS_FILE));
            }
        }

        None
    }

    /// Reject settings that would make decisions meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.decision;
        for (name, value) in [
            ("decision.same_threshold", d.same_threshold),
            ("decision.addon_min_threshold", d.addon_min_threshold),
            ("decision.same_tolerance", d.same_tolerance),
            ("decision.embedding_weight", d.embedding_weight),
            ("decision.analysis_weight", d.analysis_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if d.addon_min_threshold > d.same_threshold {
            return Err(ConfigError::Invalid(format!(
                "decision.addon_min_threshold ({}) must not exceed decision.same_threshold ({})",
                d.addon_min_threshold, d.same_threshold
            )));
        }
        let weight_sum = d.embedding_weight + d.analysis_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "decision.embedding_weight + decision.analysis_weight must equal 1.0, \
                 got {weight_sum}"
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be at least 1".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid("embedding.batch_size must be at least 1".into()));
        }
        if self.embedding.max_chars == 0 {
            return Err(ConfigError::Invalid("embedding.max_chars must be at least 1".into()));
        }
        if self.embedding.dimensions == Some(0) {
            return Err(ConfigError::Invalid("embedding.dimensions must be at least 1".into()));
        }
        for (name, secs) in [
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("generation.timeout_secs", self.generation.timeout_secs),
            ("orchestrator.unit_timeout_secs", self.orchestrator.unit_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if !matches!(
            self.embedding.provider.to_lowercase().as_str(),
            "openai" | "azure" | "fastembed" | "local" | "hashed" | "hash"
        ) {
            return Err(ConfigError::Invalid(format!(
                "embedding.provider '{}' is not one of openai, fastembed, hashed",
                self.embedding.provider
            )));
        }
        self.generation
            .auth
            .parse::<AuthScheme>()
            .map_err(|e| ConfigError::Invalid(format!("generation.auth: {e}")))?;
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "generation.temperature must be within [0, 2], got {t}"
                )));
            }
        }

        Ok(())
    }

    /// Save current configuration to file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Write default settings to `<dir>/.casebase/settings.toml`.
    pub fn init_config_file(dir: &Path, force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = dir.join(CONFIG_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err(ConfigError::AlreadyExists(config_path));
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
