//! Request/report types for uncertainty measurement.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gateway::TokenLogprob;

use super::error::MeasureError;

/// Fixed reference utterances that calibrate what "not confident" looks like in
/// logprob space.
pub const UNCERTAINTY_PHRASES: [&str; 3] = ["I'm not sure", "I'm insecure", "I need help"];

// =============================================================================
// Request
// =============================================================================

/// Parameters for one measurement.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SamplingRequest {
    /// The user's question.
    pub prompt: String,

    /// Number of independent completions to sample.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Sampling temperature in [0, 2].
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Certainty ratios above this value are reported as uncertain.
    #[serde(default = "default_threshold")]
    pub uncertainty_threshold: f64,
}

pub const DEFAULT_NUM_SAMPLES: usize = 5;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_THRESHOLD: f64 = 1.0;

fn default_num_samples() -> usize {
    DEFAULT_NUM_SAMPLES
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl SamplingRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            num_samples: DEFAULT_NUM_SAMPLES,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            uncertainty_threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.uncertainty_threshold = threshold;
        self
    }

    /// Reject malformed requests before any completion call is made.
    pub fn validate(&self) -> Result<(), MeasureError> {
        if self.prompt.trim().is_empty() {
            return Err(MeasureError::InvalidRequest("prompt is empty".into()));
        }
        if self.num_samples == 0 {
            return Err(MeasureError::InvalidRequest(
                "num_samples must be >= 1".into(),
            ));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(MeasureError::InvalidRequest(format!(
                "temperature must be in [0, 2], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(MeasureError::InvalidRequest(
                "max_tokens must be >= 1".into(),
            ));
        }
        if !self.uncertainty_threshold.is_finite() || self.uncertainty_threshold <= 0.0 {
            return Err(MeasureError::InvalidRequest(format!(
                "uncertainty_threshold must be a positive number, got {}",
                self.uncertainty_threshold
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Samples
// =============================================================================

/// One successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub text: String,
    pub token_logprobs: Vec<TokenLogprob>,
}

impl Sample {
    pub fn new(text: impl Into<String>, token_logprobs: Vec<TokenLogprob>) -> Self {
        Self {
            text: text.into(),
            token_logprobs,
        }
    }
}

/// A sample slot that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleFailure {
    /// Position of the sample in request order.
    pub index: usize,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Short error code of the last attempt.
    pub code: &'static str,
    pub message: String,
}

/// Output of the sampler: surviving samples in request order.
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub samples: Vec<Sample>,
    pub requested: usize,
    pub failures: Vec<SampleFailure>,
}

impl SampleSet {
    pub fn collected(&self) -> usize {
        self.samples.len()
    }
}

// =============================================================================
// Report
// =============================================================================

/// Qualitative uncertainty implied by response diversity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyLevel {
    Low,
    Medium,
    High,
}

impl UncertaintyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyLevel::Low => "low",
            UncertaintyLevel::Medium => "medium",
            UncertaintyLevel::High => "high",
        }
    }
}

impl fmt::Display for UncertaintyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Mean logprob of one reference phrase.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UncertaintyPhraseScore {
    pub phrase: String,
    /// `None` when the provider returned no tokens for the phrase.
    pub mean_log_probability: Option<f64>,
    pub token_count: usize,
}

/// Result of one measurement. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UncertaintyReport {
    pub prompt: String,
    /// Sampled answers in request order.
    pub responses: Vec<String>,
    pub samples_requested: usize,
    pub samples_collected: usize,
    pub unique_responses: usize,
    pub response_diversity: f64,
    pub average_token_confidence: f64,
    pub answer_mean_logprob: f64,
    pub phrase_scores: Vec<UncertaintyPhraseScore>,
    pub uncertainty_phrase_mean_logprob: f64,
    pub certainty_ratio: f64,
    pub uncertainty_threshold: f64,
    pub uncertainty_level: UncertaintyLevel,
    pub is_uncertain: bool,
    pub recommendation: String,
    pub tool_response: String,
}
