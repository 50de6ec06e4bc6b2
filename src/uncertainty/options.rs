//! Measurement settings injected at construction.

use std::time::Duration;

use crate::gateway::ChatModel;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-sample retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Model used for both sampling and phrase scoring.
    pub model: ChatModel,
    pub retry: RetryPolicy,
    /// Maximum in-flight sample calls. 1 means strictly sequential.
    pub parallelism: usize,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            model: ChatModel::new(DEFAULT_MODEL),
            retry: RetryPolicy::default(),
            parallelism: 1,
        }
    }
}

impl MeasureConfig {
    /// Read overrides from the environment; unset or unparsable values keep defaults.
    ///
    /// - `UNCERTAINTY_MODEL`, falling back to `OPENAI_MODEL`
    /// - `UNCERTAINTY_SAMPLE_RETRIES`
    /// - `UNCERTAINTY_RETRY_DELAY_MS`
    /// - `UNCERTAINTY_PARALLELISM`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let model = lookup("UNCERTAINTY_MODEL")
            .or_else(|| lookup("OPENAI_MODEL"))
            .filter(|m| !m.trim().is_empty())
            .map(ChatModel::new)
            .unwrap_or(defaults.model);

        let max_retries = lookup("UNCERTAINTY_SAMPLE_RETRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.retry.max_retries);

        let base_delay = lookup("UNCERTAINTY_RETRY_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.base_delay);

        let parallelism = lookup("UNCERTAINTY_PARALLELISM")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.parallelism)
            .max(1);

        Self {
            model,
            retry: RetryPolicy {
                max_retries,
                base_delay,
            },
            parallelism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let config = MeasureConfig::from_lookup(lookup(&[]));
        assert_eq!(config.model.model_id(), DEFAULT_MODEL);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.parallelism, 1);
    }

    #[test]
    fn overrides_are_applied() {
        let config = MeasureConfig::from_lookup(lookup(&[
            ("OPENAI_MODEL", "gpt-4"),
            ("UNCERTAINTY_SAMPLE_RETRIES", "0"),
            ("UNCERTAINTY_RETRY_DELAY_MS", "10"),
            ("UNCERTAINTY_PARALLELISM", "0"),
        ]));
        assert_eq!(config.model.model_id(), "gpt-4");
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.parallelism, 1, "parallelism is clamped to >= 1");
    }

    #[test]
    fn uncertainty_model_wins_over_openai_model() {
        let config = MeasureConfig::from_lookup(lookup(&[
            ("OPENAI_MODEL", "gpt-4"),
            ("UNCERTAINTY_MODEL", "gpt-4o"),
            ("UNCERTAINTY_SAMPLE_RETRIES", "not-a-number"),
        ]));
        assert_eq!(config.model.model_id(), "gpt-4o");
        assert_eq!(config.retry.max_retries, 2);
    }
}
