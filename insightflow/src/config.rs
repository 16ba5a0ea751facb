//! Engine configuration.
//!
//! [`EngineConfig`] holds the defaults shared by every run of an
//! orchestrator. It can be built in code with the `with_*` methods or loaded
//! from a TOML file:
//!
//! ```toml
//! model = "gpt-4o-mini"
//! per_stage_timeout_ms = 60000
//!
//! [retry]
//! max_retries = 3
//!
//! [stages.reviewer]
//! temperature = 0.25
//! top_k = 8
//! ```

use crate::core::StageRole;
use crate::errors::{ConfigError, InsightflowError};
use crate::pipeline::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_per_stage_timeout_ms() -> u64 {
    120_000
}

fn default_per_call_timeout_ms() -> u64 {
    30_000
}

fn default_fan_out() -> usize {
    4
}

fn default_max_concurrent_workflows() -> usize {
    4
}

/// Per-role generation and retrieval tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTuning {
    /// Generation temperature.
    pub temperature: f32,
    /// Passages requested per retrieval sub-query.
    pub top_k: usize,
}

impl StageTuning {
    /// The built-in tuning for a role.
    #[must_use]
    pub fn for_role(role: StageRole) -> Self {
        Self {
            temperature: role.default_temperature(),
            top_k: role.default_top_k(),
        }
    }
}

/// Optional per-role tuning overrides, keyed by role name in TOML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOverrides {
    /// Researcher override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub researcher: Option<StageTuning>,
    /// Reviewer override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<StageTuning>,
    /// Synthesizer override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesizer: Option<StageTuning>,
    /// Questioner override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questioner: Option<StageTuning>,
    /// Formatter override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<StageTuning>,
}

impl StageOverrides {
    /// Returns the override for a role.
    #[must_use]
    pub fn get(&self, role: StageRole) -> Option<StageTuning> {
        match role {
            StageRole::Researcher => self.researcher,
            StageRole::Reviewer => self.reviewer,
            StageRole::Synthesizer => self.synthesizer,
            StageRole::Questioner => self.questioner,
            StageRole::Formatter => self.formatter,
        }
    }

    /// Sets the override for a role.
    pub fn set(&mut self, role: StageRole, tuning: StageTuning) {
        let slot = match role {
            StageRole::Researcher => &mut self.researcher,
            StageRole::Reviewer => &mut self.reviewer,
            StageRole::Synthesizer => &mut self.synthesizer,
            StageRole::Questioner => &mut self.questioner,
            StageRole::Formatter => &mut self.formatter,
        };
        *slot = Some(tuning);
    }
}

/// Endpoints for the HTTP-backed services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the retrieval service.
    #[serde(default)]
    pub retrieval_url: Option<String>,
    /// Base URL of an OpenAI-compatible chat-completions API.
    #[serde(default)]
    pub generation_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// Configuration shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model identifier passed to the generation service.
    #[serde(default = "default_model")]
    pub model: String,

    /// Token budget per generation call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Retry and backoff policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Budget for one stage attempt, in milliseconds.
    #[serde(default = "default_per_stage_timeout_ms")]
    pub per_stage_timeout_ms: u64,

    /// Budget for one external call, in milliseconds.
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,

    /// Concurrent retrieval sub-queries within a stage.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Concurrent workflow runs per orchestrator.
    #[serde(default = "default_max_concurrent_workflows")]
    pub max_concurrent_workflows: usize,

    /// Per-role overrides of the built-in tuning.
    #[serde(default)]
    pub stages: StageOverrides,

    /// Service endpoints, used by the HTTP adapters.
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            retry: RetryConfig::default(),
            per_stage_timeout_ms: default_per_stage_timeout_ms(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            fan_out: default_fan_out(),
            max_concurrent_workflows: default_max_concurrent_workflows(),
            stages: StageOverrides::default(),
            endpoints: EndpointConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::new("<toml>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InsightflowError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_toml_str(&content)?)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::new("model", "must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::new("max_tokens", "must be positive"));
        }
        if self.per_stage_timeout_ms == 0 {
            return Err(ConfigError::new("per_stage_timeout_ms", "must be positive"));
        }
        if self.per_call_timeout_ms == 0 {
            return Err(ConfigError::new("per_call_timeout_ms", "must be positive"));
        }
        if self.fan_out == 0 {
            return Err(ConfigError::new("fan_out", "must be at least 1"));
        }
        if self.max_concurrent_workflows == 0 {
            return Err(ConfigError::new("max_concurrent_workflows", "must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::new(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        for role in StageRole::ALL {
            let Some(tuning) = self.stages.get(role) else {
                continue;
            };
            if !(0.0..=2.0).contains(&tuning.temperature) {
                return Err(ConfigError::new(
                    format!("stages.{role}.temperature"),
                    "must be between 0.0 and 2.0",
                ));
            }
        }
        Ok(())
    }

    /// Effective tuning for a role.
    #[must_use]
    pub fn tuning(&self, role: StageRole) -> StageTuning {
        self.stages
            .get(role)
            .unwrap_or_else(|| StageTuning::for_role(role))
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_per_stage_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.per_stage_timeout_ms = timeout_ms;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_per_call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.per_call_timeout_ms = timeout_ms;
        self
    }

    /// Sets the retrieval fan-out.
    #[must_use]
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Sets the global concurrent-run limit.
    #[must_use]
    pub fn with_max_concurrent_workflows(mut self, limit: usize) -> Self {
        self.max_concurrent_workflows = limit;
        self
    }

    /// Overrides the tuning of one role.
    #[must_use]
    pub fn with_stage_tuning(mut self, role: StageRole, tuning: StageTuning) -> Self {
        self.stages.set(role, tuning);
        self
    }

    /// Sets the service endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: EndpointConfig) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fan_out, 4);
        assert_eq!(config.retry.max_retries, 2);
    }

    #[test]
    fn test_tuning_falls_back_to_role_defaults() {
        let config = EngineConfig::new().with_stage_tuning(
            StageRole::Reviewer,
            StageTuning {
                temperature: 0.1,
                top_k: 3,
            },
        );

        assert_eq!(config.tuning(StageRole::Reviewer).top_k, 3);
        assert_eq!(config.tuning(StageRole::Researcher), StageTuning::for_role(StageRole::Researcher));
    }

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str(
            r#"
            model = "local-model"
            fan_out = 2

            [retry]
            max_retries = 4
            base_delay_ms = 10

            [stages.questioner]
            temperature = 0.5
            top_k = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.model, "local-model");
        assert_eq!(config.fan_out, 2);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.rate_limit_multiplier, 4);
        assert_eq!(config.tuning(StageRole::Questioner).top_k, 7);
        assert_eq!(config.per_call_timeout_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let err = EngineConfig::new().with_fan_out(0).validate().unwrap_err();
        assert_eq!(err.field, "fan_out");

        let err = EngineConfig::from_toml_str("[stages.reviewer]\ntemperature = 3.0\ntop_k = 1").unwrap_err();
        assert_eq!(err.field, "stages.reviewer.temperature");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model = \"file-model\"").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.model, "file-model");
    }

    #[test]
    fn test_from_file_missing() {
        let result = EngineConfig::from_file("/nonexistent/insightflow.toml");
        assert!(matches!(result, Err(InsightflowError::Io(_))));
    }
}
