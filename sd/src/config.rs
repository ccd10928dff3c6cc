//! sessiond configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::context::ContextThresholds;
use crate::domain::BudgetCaps;
use crate::health::HealthThresholds;

/// Main sessiond configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Per-session budget caps
    pub budget: BudgetCaps,

    /// Context-window thresholds
    pub context: ContextConfig,

    /// Loop-health thresholds
    pub health: HealthConfig,

    /// Model pricing (env-overridable)
    pub pricing: PricingConfig,

    /// Session lifecycle knobs
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".sessiond.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sessiond").join("sessiond.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.pricing.apply_env_overrides();
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model identifier for session loops
    pub model: String,

    /// Haiku-tier model for cheap summarization
    pub summary_model: String,

    /// Sonnet-tier model for heavier summarization
    pub summary_model_deep: String,

    /// Environment variable containing the API key
    pub api_key_env: String,

    /// API base URL
    pub base_url: String,

    /// Maximum tokens per response
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            summary_model: "claude-3-5-haiku-20241022".to_string(),
            summary_model_deep: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 16384,
            timeout_ms: 300_000,
        }
    }
}

/// Context-window thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContextConfig {
    /// Context window in tokens
    pub window: usize,

    /// Warn above this fraction
    pub warn_ratio: f64,

    /// Compact above this fraction
    pub compact_ratio: f64,

    /// Compaction target fraction
    pub target_ratio: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window: 200_000,
            warn_ratio: 0.40,
            compact_ratio: 0.50,
            target_ratio: 0.35,
        }
    }
}

impl From<ContextConfig> for ContextThresholds {
    fn from(config: ContextConfig) -> Self {
        Self {
            window: config.window,
            warn_ratio: config.warn_ratio,
            compact_ratio: config.compact_ratio,
            target_ratio: config.target_ratio,
        }
    }
}

/// Loop-health thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HealthConfig {
    pub max_consecutive_failures: u32,
    pub max_quality_gate_attempts: u32,
    pub max_item_blocks: u32,
    pub max_validation_failures: u32,
    pub max_repetitions: u32,
    pub max_repetition_blocks: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let defaults = HealthThresholds::default();
        Self {
            max_consecutive_failures: defaults.max_consecutive_failures,
            max_quality_gate_attempts: defaults.max_quality_gate_attempts,
            max_item_blocks: defaults.max_item_blocks,
            max_validation_failures: defaults.max_validation_failures,
            max_repetitions: defaults.max_repetitions,
            max_repetition_blocks: defaults.max_repetition_blocks,
        }
    }
}

impl From<HealthConfig> for HealthThresholds {
    fn from(config: HealthConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            max_quality_gate_attempts: config.max_quality_gate_attempts,
            max_item_blocks: config.max_item_blocks,
            max_validation_failures: config.max_validation_failures,
            max_repetitions: config.max_repetitions,
            max_repetition_blocks: config.max_repetition_blocks,
        }
    }
}

/// Per-model-family pricing in $ per million tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PricingConfig {
    pub sonnet_input: f64,
    pub sonnet_output: f64,
    pub opus_input: f64,
    pub opus_output: f64,
    pub haiku_input: f64,
    pub haiku_output: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            sonnet_input: 3.0,
            sonnet_output: 15.0,
            opus_input: 5.0,
            opus_output: 25.0,
            haiku_input: 0.25,
            haiku_output: 1.25,
        }
    }
}

impl PricingConfig {
    /// Apply `SD_PRICE_<FAMILY>_{INPUT,OUTPUT}` environment overrides
    ///
    /// Read once at startup; tests inject the struct directly instead.
    pub fn apply_env_overrides(&mut self) {
        let overrides: [(&str, &mut f64); 6] = [
            ("SD_PRICE_SONNET_INPUT", &mut self.sonnet_input),
            ("SD_PRICE_SONNET_OUTPUT", &mut self.sonnet_output),
            ("SD_PRICE_OPUS_INPUT", &mut self.opus_input),
            ("SD_PRICE_OPUS_OUTPUT", &mut self.opus_output),
            ("SD_PRICE_HAIKU_INPUT", &mut self.haiku_input),
            ("SD_PRICE_HAIKU_OUTPUT", &mut self.haiku_output),
        ];

        for (var, slot) in overrides {
            if let Ok(raw) = std::env::var(var)
                && let Ok(price) = raw.parse::<f64>()
            {
                *slot = price;
            }
        }
    }

    /// `(input, output)` $/MTok for a model id, by family substring
    pub fn for_model(&self, model: &str) -> (f64, f64) {
        if model.contains("opus") {
            (self.opus_input, self.opus_output)
        } else if model.contains("haiku") {
            (self.haiku_input, self.haiku_output)
        } else {
            (self.sonnet_input, self.sonnet_output)
        }
    }

    /// Accumulated cost in USD
    pub fn cost_usd(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let (input_price, output_price) = self.for_model(model);
        (input_tokens as f64 / 1_000_000.0) * input_price + (output_tokens as f64 / 1_000_000.0) * output_price
    }
}

/// Session lifecycle knobs
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Checkpoint every N iterations
    pub checkpoint_interval: u32,

    /// Seconds to wait for a loop to unwind on stop
    pub stop_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 5,
            stop_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.context.window, 200_000);
        assert_eq!(config.session.checkpoint_interval, 5);
        assert_eq!(config.budget.max_runtime_secs, 4 * 60 * 60);
    }

    #[test]
    fn test_pricing_for_model() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.for_model("claude-opus-4"), (5.0, 25.0));
        assert_eq!(pricing.for_model("claude-sonnet-4-20250514"), (3.0, 15.0));
        assert_eq!(pricing.for_model("claude-3-5-haiku"), (0.25, 1.25));
        assert_eq!(pricing.for_model("unknown-model"), (3.0, 15.0));
    }

    #[test]
    fn test_pricing_cost() {
        let pricing = PricingConfig::default();
        let cost = pricing.cost_usd("claude-sonnet-4", 1_000_000, 100_000);
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_yaml_kebab_case() {
        let yaml = "\
llm:
  provider: anthropic
  model: claude-opus-4
  max-tokens: 4096
context:
  compact-ratio: 0.6
session:
  checkpoint-interval: 10
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.model, "claude-opus-4");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.context.compact_ratio, 0.6);
        assert_eq!(config.session.checkpoint_interval, 10);
        // Unspecified sections fall back to defaults
        assert_eq!(config.health.max_consecutive_failures, 5);
    }
}
