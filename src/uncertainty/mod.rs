//! Uncertainty measurement.
//!
//! Samples several completions for one prompt and combines two signals:
//! - response diversity across samples (qualitative level)
//! - the certainty ratio: mean answer logprob over the mean logprob of fixed
//!   hedging phrases (binary decision against a threshold)

pub mod confidence;
pub mod decision;
pub mod diversity;
pub mod error;
pub mod measure;
pub mod options;
pub mod sampler;
pub mod types;

pub use confidence::{
    aggregate_phrase_scores, mean_logprob, score_answer_logprob, score_confidence, PhraseScorer,
};
pub use decision::{clarification_request, decide, recommendation, tool_response, Decision};
pub use diversity::{analyze_diversity, level_for_diversity, DiversityAnalysis};
pub use error::{MeasureError, Phase};
pub use measure::{measure, UncertaintyMeasurer};
pub use options::{MeasureConfig, RetryPolicy, DEFAULT_MODEL};
pub use sampler::Sampler;
pub use types::*;
