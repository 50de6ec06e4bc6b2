//! Typed failures of a measurement.

use std::fmt;

use crate::gateway::ProviderError;

use super::types::SampleFailure;

/// Stage of the measurement pipeline an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validation,
    Sampling,
    AnswerScoring,
    PhraseScoring,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Validation => "validation",
            Phase::Sampling => "sampling",
            Phase::AnswerScoring => "answer scoring",
            Phase::PhraseScoring => "phrase scoring",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("all {requested} samples failed")]
    AllSamplesFailed {
        requested: usize,
        failures: Vec<SampleFailure>,
    },

    #[error("scoring uncertainty phrase {phrase:?} failed: {source}")]
    PhraseScoring {
        phrase: String,
        samples_collected: usize,
        #[source]
        source: ProviderError,
    },

    #[error("no token logprobs to average during {phase}")]
    DegenerateLogprob {
        phase: Phase,
        samples_collected: usize,
    },
}

impl MeasureError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::InvalidRequest(_) => Phase::Validation,
            Self::AllSamplesFailed { .. } => Phase::Sampling,
            Self::PhraseScoring { .. } => Phase::PhraseScoring,
            Self::DegenerateLogprob { phase, .. } => *phase,
        }
    }

    /// Samples that succeeded before the failure.
    pub fn samples_collected(&self) -> usize {
        match self {
            Self::InvalidRequest(_) | Self::AllSamplesFailed { .. } => 0,
            Self::PhraseScoring {
                samples_collected, ..
            }
            | Self::DegenerateLogprob {
                samples_collected, ..
            } => *samples_collected,
        }
    }

    /// Short code for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::AllSamplesFailed { .. } => "all_samples_failed",
            Self::PhraseScoring { .. } => "phrase_scoring_failure",
            Self::DegenerateLogprob { .. } => "degenerate_logprob",
        }
    }
}
