//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/hypoforge/) and project (.hypoforge/) level
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{pipeline as pipeline_constants, provider as provider_constants, research};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Generative-AI provider settings
    pub provider: ProviderSettings,

    /// Pipeline execution settings
    pub pipeline: PipelineSettings,

    /// Database settings
    pub database: DatabaseSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            provider: ProviderSettings::default(),
            pipeline: PipelineSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> crate::types::Result<()> {
        use crate::types::ForgeError;

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ForgeError::Config(format!(
                "provider.temperature must be in 0.0..=2.0, got {}",
                self.provider.temperature
            )));
        }
        if self.pipeline.poll_interval_secs == 0 {
            return Err(ForgeError::Config(
                "pipeline.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.pipeline.research_timeout_secs < self.pipeline.poll_interval_secs {
            return Err(ForgeError::Config(
                "pipeline.research_timeout_secs must be at least one poll interval".to_string(),
            ));
        }
        if self.pipeline.max_concurrent_research == 0 {
            return Err(ForgeError::Config(
                "pipeline.max_concurrent_research must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Provider Settings
// =============================================================================

/// Generative-AI provider settings
///
/// The API key is never serialized to output; set it via the
/// `HYPOFORGE_PROVIDER_API_KEY` environment variable or the config file.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// API base URL
    pub api_base: String,
    /// API key - never serialized to output for security
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// High-quality model for synthesis/scoring steps
    pub pro_model: String,
    /// Cheaper model for extraction and lighter steps
    pub flash_model: String,
    /// Request timeout for synchronous completions (seconds)
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum output tokens for completions
    pub max_output_tokens: usize,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("pro_model", &self.pro_model)
            .field("flash_model", &self.flash_model)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            pro_model: "gemini-2.5-pro".to_string(),
            flash_model: "gemini-2.5-flash".to_string(),
            timeout_secs: provider_constants::DEFAULT_TIMEOUT_SECS,
            temperature: provider_constants::DEFAULT_TEMPERATURE,
            max_output_tokens: provider_constants::DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

// =============================================================================
// Pipeline Settings
// =============================================================================

/// Which research execution strategy the sequencer uses for step 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStrategyKind {
    /// One research interaction covering all requested hypotheses
    Shared,
    /// Per-hypothesis research with a bounded concurrency window
    FanOut,
}

/// Pipeline execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Research strategy for step 2
    pub research_strategy: ResearchStrategyKind,
    /// Interval between research-handle polls (seconds)
    pub poll_interval_secs: u64,
    /// Hard ceiling on a research interaction (seconds)
    pub research_timeout_secs: u64,
    /// Bounded window for per-hypothesis research fan-out
    pub max_concurrent_research: usize,
    /// Automatic regeneration attempts for insufficient count
    pub validation_max_retries: usize,
    /// Minimum spacing between research starts (seconds)
    pub min_research_spacing_secs: u64,
    /// Wall-clock budget for one sequencer invocation (seconds)
    pub invocation_budget_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            research_strategy: ResearchStrategyKind::Shared,
            poll_interval_secs: research::POLL_INTERVAL_SECS,
            research_timeout_secs: research::TIMEOUT_SECS,
            max_concurrent_research: pipeline_constants::MAX_CONCURRENT_RESEARCH,
            validation_max_retries: pipeline_constants::VALIDATION_MAX_RETRIES,
            min_research_spacing_secs: research::MIN_START_SPACING_SECS,
            invocation_budget_secs: pipeline_constants::INVOCATION_BUDGET_SECS,
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".hypoforge/hypoforge.db"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_temperature_rejected() {
        let mut config = Config::default();
        config.provider.temperature = 3.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = Config::default();
        config.pipeline.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut settings = ProviderSettings::default();
        settings.api_key = Some("secret-key".to_string());
        let toml = toml::to_string(&settings).unwrap();
        assert!(!toml.contains("secret-key"));

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
    }
}
