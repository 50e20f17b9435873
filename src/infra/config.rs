// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::infra::errors::ArcherError;
use crate::infra::paths;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub evaluator: EvaluatorConfig,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub archer: ArcherConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Endpoint settings for the bundled OpenAI-compatible adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            request_timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            max_tokens: Some(1024),
            timeout_secs: 60,
            max_concurrency: 4,
        }
    }
}

impl GeneratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub model: String,
    pub temperature: f32,
    pub max_score: f32,
    pub rubric: String,
    pub timeout_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: 0.1,
            max_score: 5.0,
            rubric: "Judge how well the response fulfils the request. Consider accuracy, \
                     completeness, clarity and tone. 1 is unusable, 5 is excellent."
                .into(),
            timeout_secs: 60,
        }
    }
}

impl EvaluatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ArcherError> {
        if self.max_score <= 0.0 {
            return Err(ArcherError::Config(format!(
                "evaluator.max_score must be positive, got {}",
                self.max_score
            )));
        }
        if self.rubric.trim().is_empty() {
            return Err(ArcherError::Config("evaluator.rubric is empty".into()));
        }
        Ok(())
    }
}

/// Settings for the prompt optimizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub model: String,
    /// Base temperature; rewrites add a magnitude-scaled bump on top.
    pub temperature: f32,
    /// Use the gradient-biased backend (falls back to the standard path on error).
    pub gradient_enabled: bool,
    /// Proposal attempts per parameter in the gradient backend.
    pub max_trials: u32,
    /// Parameters rewritten per propose step, highest magnitude first.
    pub top_k: usize,
    pub max_score: f32,
    pub max_tokens: Option<u32>,
    pub num_variants: usize,
    pub max_retries: u32,
    pub variant_traits: Vec<String>,
    pub optimize_timeout_secs: u64,
    pub variant_timeout_secs: u64,
    pub variant_phase_timeout_secs: u64,
    pub max_concurrency: usize,
    /// Keep the pre-rewrite prompts in the candidate pool.
    pub retain_parents: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: 0.7,
            gradient_enabled: false,
            max_trials: 2,
            top_k: 4,
            max_score: 5.0,
            max_tokens: Some(1024),
            num_variants: 2,
            max_retries: 3,
            variant_traits: vec![
                "more concise".into(),
                "more detailed and explicit".into(),
                "more structured, with numbered steps".into(),
                "warmer and more conversational".into(),
            ],
            optimize_timeout_secs: 60,
            variant_timeout_secs: 30,
            variant_phase_timeout_secs: 120,
            max_concurrency: 4,
            retain_parents: true,
        }
    }
}

impl OptimizerConfig {
    pub fn optimize_timeout(&self) -> Duration {
        Duration::from_secs(self.optimize_timeout_secs)
    }

    pub fn variant_timeout(&self) -> Duration {
        Duration::from_secs(self.variant_timeout_secs)
    }

    pub fn variant_phase_timeout(&self) -> Duration {
        Duration::from_secs(self.variant_phase_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ArcherError> {
        if self.model.trim().is_empty() {
            return Err(ArcherError::Config("optimizer.model is empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ArcherError::Config(format!(
                "optimizer.temperature must be within 0.0-2.0, got {}",
                self.temperature
            )));
        }
        if self.max_score <= 0.0 {
            return Err(ArcherError::Config(format!(
                "optimizer.max_score must be positive, got {}",
                self.max_score
            )));
        }
        if self.max_trials == 0 || self.top_k == 0 {
            return Err(ArcherError::Config(
                "optimizer.max_trials and optimizer.top_k must be at least 1".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ArcherError::Config(
                "optimizer.max_concurrency must be at least 1".into(),
            ));
        }
        if self.optimize_timeout_secs == 0
            || self.variant_timeout_secs == 0
            || self.variant_phase_timeout_secs == 0
        {
            return Err(ArcherError::Config(
                "optimizer timeouts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for the training loop itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArcherConfig {
    pub max_prompts_per_cycle: usize,
    pub num_simulations: usize,
    pub selection_quantile: f64,
    /// Consecutive backward-pass failures before the breaker opens.
    pub error_threshold: u32,
    pub recovery_secs: u64,
    /// Mutate a named prompt model in place instead of building a candidate pool.
    pub use_model_optimization: bool,
    /// How many human-validated evaluations to fold into backward-pass feedback.
    pub validated_feedback_limit: usize,
}

impl Default for ArcherConfig {
    fn default() -> Self {
        Self {
            max_prompts_per_cycle: 4,
            num_simulations: 3,
            selection_quantile: 0.5,
            error_threshold: 3,
            recovery_secs: 300,
            use_model_optimization: false,
            validated_feedback_limit: 20,
        }
    }
}

impl ArcherConfig {
    pub fn recovery_duration(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }

    pub fn validate(&self) -> Result<(), ArcherError> {
        if self.max_prompts_per_cycle == 0 {
            return Err(ArcherError::Config(
                "archer.max_prompts_per_cycle must be at least 1".into(),
            ));
        }
        if self.num_simulations == 0 {
            return Err(ArcherError::Config(
                "archer.num_simulations must be at least 1".into(),
            ));
        }
        if !(self.selection_quantile > 0.0 && self.selection_quantile <= 1.0) {
            return Err(ArcherError::Config(format!(
                "archer.selection_quantile must be in (0, 1], got {}",
                self.selection_quantile
            )));
        }
        if self.error_threshold == 0 {
            return Err(ArcherError::Config(
                "archer.error_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub dirs: Vec<String>,
    /// Upper bound on knowledge text injected into evaluator requests.
    pub max_chars: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dirs: Vec::new(),
            max_chars: 6_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    /// Defaults to the platform data dir when unset.
    pub db_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_db_path(&self) -> std::path::PathBuf {
        self.db_path
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(paths::db_path)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ArcherError> {
        self.evaluator.validate()?;
        self.optimizer.validate()?;
        self.archer.validate()?;
        if self.generator.max_concurrency == 0 {
            return Err(ArcherError::Config(
                "generator.max_concurrency must be at least 1".into(),
            ));
        }
        // scores from the judge feed the optimizer's magnitude directly
        if (self.evaluator.max_score - self.optimizer.max_score).abs() > f32::EPSILON {
            return Err(ArcherError::Config(format!(
                "evaluator.max_score ({}) and optimizer.max_score ({}) must match",
                self.evaluator.max_score, self.optimizer.max_score
            )));
        }
        Ok(())
    }
}
