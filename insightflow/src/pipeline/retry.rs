//! Retry policy with configurable backoff and jitter strategies.
//!
//! A stage gets at most `max_retries + 1` attempts. What happens between two
//! attempts depends on the [`RetryClass`] of the failure: grounding
//! violations regenerate immediately, transport failures back off, and rate
//! limits back off longer.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    #[default]
    Equal,
    /// min(max, random(base, prev * 3))
    Decorrelated,
}

/// How a failed attempt should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Retry without waiting (regeneration after a grounding violation).
    Immediate,
    /// Retry after the configured backoff.
    Standard,
    /// Retry after a stretched backoff, or the server hint if larger.
    RateLimited {
        /// Server-provided wait hint in milliseconds.
        retry_after_ms: Option<u64>,
    },
    /// Do not retry.
    NotRetryable,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
    /// Factor applied to the backoff for rate-limited failures.
    pub rate_limit_multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Equal,
            rate_limit_multiplier: 4,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Sets the rate-limit multiplier.
    #[must_use]
    pub fn with_rate_limit_multiplier(mut self, multiplier: u32) -> Self {
        self.rate_limit_multiplier = multiplier;
        self
    }

    /// Maximum attempts per stage, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Longest wait after a rate limit, including a server hint.
    #[must_use]
    pub fn max_rate_limited_delay(&self) -> Duration {
        Duration::from_millis(
            self.max_delay_ms
                .saturating_mul(u64::from(self.rate_limit_multiplier.max(1))),
        )
    }
}

/// Retry bookkeeping for a single stage.
#[derive(Debug, Default)]
pub struct RetryState {
    /// Failed attempts so far.
    pub attempt: u32,
    previous_delay_ms: Option<u64>,
}

impl RetryState {
    /// Creates a new retry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no attempt remains.
    #[must_use]
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts()
    }

    /// Calculates the backoff delay for the current attempt.
    #[must_use]
    pub fn calculate_delay(&mut self, config: &RetryConfig) -> Duration {
        let base = config.base_delay_ms;
        let max = config.max_delay_ms;
        let attempt = self.attempt.saturating_sub(1);

        let delay = match config.backoff_strategy {
            BackoffStrategy::Exponential => {
                base.saturating_mul(2u64.saturating_pow(attempt)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match config.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            JitterStrategy::Decorrelated => {
                let prev = self.previous_delay_ms.unwrap_or(base);
                let upper = prev.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        };

        self.previous_delay_ms = Some(jittered);
        Duration::from_millis(jittered)
    }

    /// Records a failed attempt and decides what happens next.
    pub fn record_failure(&mut self, class: RetryClass, config: &RetryConfig) -> RetryDecision {
        self.attempt += 1;

        let delay = match class {
            RetryClass::NotRetryable => return RetryDecision::NotRetryable,
            _ if self.is_exhausted(config) => return RetryDecision::GiveUp,
            RetryClass::Immediate => Duration::ZERO,
            RetryClass::Standard => self.calculate_delay(config),
            RetryClass::RateLimited { retry_after_ms } => {
                let stretched = self
                    .calculate_delay(config)
                    .saturating_mul(config.rate_limit_multiplier.max(1));
                let hinted = Duration::from_millis(retry_after_ms.unwrap_or(0));
                stretched.max(hinted).min(config.max_rate_limited_delay())
            }
        };

        RetryDecision::Retry(delay)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.rate_limit_multiplier, 4);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_retries(5)
            .with_base_delay_ms(50)
            .with_max_delay_ms(1000)
            .with_backoff(BackoffStrategy::Linear)
            .with_jitter(JitterStrategy::None);

        assert_eq!(config.max_attempts(), 6);
        assert_eq!(config.base_delay_ms, 50);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_calculate_delay_exponential_no_jitter() {
        let config = no_jitter();
        let mut state = RetryState::new();

        state.attempt = 1;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(100));
        state.attempt = 2;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(200));
        state.attempt = 3;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(400));
    }

    #[test]
    fn test_calculate_delay_linear_and_constant() {
        let mut state = RetryState::new();
        state.attempt = 3;

        let linear = no_jitter().with_backoff(BackoffStrategy::Linear);
        assert_eq!(state.calculate_delay(&linear), Duration::from_millis(300));

        let constant = no_jitter().with_backoff(BackoffStrategy::Constant);
        assert_eq!(state.calculate_delay(&constant), Duration::from_millis(100));
    }

    #[test]
    fn test_calculate_delay_capped_at_max() {
        let config = no_jitter().with_base_delay_ms(1000).with_max_delay_ms(5000);
        let mut state = RetryState::new();
        state.attempt = 11;
        assert_eq!(state.calculate_delay(&config), Duration::from_millis(5000));
    }

    #[test]
    fn test_calculate_delay_equal_jitter_bounds() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_backoff(BackoffStrategy::Constant)
            .with_jitter(JitterStrategy::Equal);
        let mut state = RetryState::new();
        state.attempt = 1;

        for _ in 0..10 {
            let delay = state.calculate_delay(&config).as_millis();
            assert!((50..=100).contains(&delay));
        }
    }

    #[test]
    fn test_record_failure_immediate_has_no_delay() {
        let config = no_jitter();
        let mut state = RetryState::new();
        assert_eq!(
            state.record_failure(RetryClass::Immediate, &config),
            RetryDecision::Retry(Duration::ZERO)
        );
    }

    #[test]
    fn test_record_failure_rate_limited_stretches_delay() {
        let config = no_jitter().with_rate_limit_multiplier(4);
        let mut state = RetryState::new();
        let decision = state.record_failure(
            RetryClass::RateLimited {
                retry_after_ms: None,
            },
            &config,
        );
        assert_eq!(decision, RetryDecision::Retry(Duration::from_millis(400)));

        let mut state = RetryState::new();
        let decision = state.record_failure(
            RetryClass::RateLimited {
                retry_after_ms: Some(2_000),
            },
            &config,
        );
        assert_eq!(decision, RetryDecision::Retry(Duration::from_millis(2_000)));
    }

    #[test]
    fn test_record_failure_rate_limit_hint_is_capped() {
        let config = no_jitter()
            .with_base_delay_ms(1)
            .with_max_delay_ms(5)
            .with_rate_limit_multiplier(4);
        let mut state = RetryState::new();
        let decision = state.record_failure(
            RetryClass::RateLimited {
                retry_after_ms: Some(3_600_000),
            },
            &config,
        );
        assert_eq!(decision, RetryDecision::Retry(Duration::from_millis(20)));
        assert_eq!(config.max_rate_limited_delay(), Duration::from_millis(20));
    }

    #[test]
    fn test_record_failure_gives_up_after_max_attempts() {
        let config = no_jitter().with_max_retries(2);
        let mut state = RetryState::new();

        assert!(matches!(
            state.record_failure(RetryClass::Standard, &config),
            RetryDecision::Retry(_)
        ));
        assert!(matches!(
            state.record_failure(RetryClass::Standard, &config),
            RetryDecision::Retry(_)
        ));
        assert_eq!(
            state.record_failure(RetryClass::Standard, &config),
            RetryDecision::GiveUp
        );
        assert!(state.is_exhausted(&config));
    }

    #[test]
    fn test_record_failure_not_retryable() {
        let config = no_jitter();
        let mut state = RetryState::new();
        assert_eq!(
            state.record_failure(RetryClass::NotRetryable, &config),
            RetryDecision::NotRetryable
        );
    }
}
