use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_extraction_model")]
    pub model: String,
    /// Extra attempts after the first when the model output is malformed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Feed the previous validation error back into the retried prompt.
    #[serde(default)]
    pub feedback_on_retry: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_extraction_model(),
            max_retries: default_max_retries(),
            feedback_on_retry: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_reports_path")]
    pub reports: String,
    #[serde(default = "default_extracted_path")]
    pub extracted: String,
    #[serde(default = "default_mapped_path")]
    pub mapped: String,
    #[serde(default = "default_finding_models_path")]
    pub finding_models: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reports: default_reports_path(),
            extracted: default_extracted_path(),
            mapped: default_mapped_path(),
            finding_models: default_finding_models_path(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_extraction_model() -> String {
    "gpt-4-turbo".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_batch_size() -> usize {
    64
}
pub fn default_threshold() -> f32 {
    0.70
}
fn default_reports_path() -> String {
    "data/sample_reports.jsonl".to_string()
}
fn default_extracted_path() -> String {
    "data/extracted_findings.jsonl".to_string()
}
fn default_mapped_path() -> String {
    "data/mapped_findings.jsonl".to_string()
}
fn default_finding_models_path() -> String {
    "data/finding_models.json".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mapping.threshold must be within [0, 1], got {0}")]
    Threshold(f32),
    #[error("embeddings.batch_size must be at least 1")]
    BatchSize,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.mapping.threshold;
        if !t.is_finite() || !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::Threshold(t));
        }
        if self.embeddings.batch_size == 0 {
            return Err(ConfigError::BatchSize);
        }
        Ok(())
    }
}

/// Loads configuration from an optional TOML file layered under
/// `RADMAP__`-prefixed environment variables.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    settings = settings.add_source(
        config::Environment::with_prefix("RADMAP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    let cfg: AppConfig = settings.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
