use std::time::Duration;

use psikotes_core::config::{LlmConfig, SafetyThreshold};

/// Limits applied to a single model call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvocationPolicy {
    pub timeout: Duration,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub safety_threshold: SafetyThreshold,
}

impl InvocationPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            safety_threshold: config.safety_threshold,
        }
    }
}

impl Default for InvocationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_tokens: 800,
            temperature: 0.7,
            safety_threshold: SafetyThreshold::BlockNone,
        }
    }
}

/// Bounded retry around transport failures only. Safety blocks, truncation and completed
/// responses are never retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self { max_retries: 0, backoff: Duration::ZERO }
    }

    /// Linear backoff: the n-th retry waits `n * backoff`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(retry)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 1, backoff: Duration::from_millis(500) }
    }
}
