//! Per-run invocation types.

use crate::core::StageRole;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-run overrides on top of the engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    /// Model identifier for every stage.
    pub model: Option<String>,
    /// Temperature per stage.
    pub temperature_overrides: HashMap<StageRole, f32>,
    /// Retries per stage after the first attempt.
    pub max_retries: Option<u32>,
    /// Budget for one stage attempt, in milliseconds.
    pub per_stage_timeout_ms: Option<u64>,
}

impl WorkflowOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Overrides one stage's temperature.
    #[must_use]
    pub fn with_temperature(mut self, role: StageRole, temperature: f32) -> Self {
        self.temperature_overrides.insert(role, temperature);
        self
    }

    /// Overrides every stage's temperature.
    #[must_use]
    pub fn with_temperature_all(mut self, temperature: f32) -> Self {
        for role in StageRole::ALL {
            self.temperature_overrides.insert(role, temperature);
        }
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the per-stage timeout.
    #[must_use]
    pub fn with_per_stage_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.per_stage_timeout_ms = Some(timeout_ms);
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(ConfigError::new("options.model", "must not be empty"));
        }
        if self.per_stage_timeout_ms == Some(0) {
            return Err(ConfigError::new("options.per_stage_timeout_ms", "must be positive"));
        }
        let mut overrides: Vec<_> = self.temperature_overrides.iter().collect();
        overrides.sort_by_key(|(role, _)| role.index());
        for (role, temperature) in overrides {
            if !(0.0..=2.0).contains(temperature) {
                return Err(ConfigError::new(
                    format!("options.temperature_overrides.{role}"),
                    "must be between 0.0 and 2.0",
                ));
            }
        }
        Ok(())
    }
}

/// A request to run one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// The research query.
    pub query: String,
    /// Per-run overrides.
    #[serde(default)]
    pub options: WorkflowOptions,
}

impl WorkflowRequest {
    /// Creates a request with default options.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            options: WorkflowOptions::default(),
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: WorkflowOptions) -> Self {
        self.options = options;
        self
    }
}
