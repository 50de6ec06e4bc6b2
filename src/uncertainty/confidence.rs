//! Logprob reductions: token confidence, answer mean, uncertainty-phrase means.
//!
//! Means are taken in natural-log space so the answer and the reference phrases
//! are directly comparable. Empty token sequences contribute nothing to a mean;
//! counting them as 0.0 would read as perfect confidence.

use tracing::debug;
use uuid::Uuid;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::gateway::TokenLogprob;

use super::error::{MeasureError, Phase};
use super::options::RetryPolicy;
use super::sampler::complete_with_retry;
use super::types::{Sample, SamplingRequest, UncertaintyPhraseScore};

fn finite_logprobs(tokens: &[TokenLogprob]) -> impl Iterator<Item = f64> + '_ {
    tokens.iter().map(|t| t.logprob).filter(|lp| lp.is_finite())
}

/// Mean logprob of one sequence, `None` if it has no usable tokens.
pub fn mean_logprob(tokens: &[TokenLogprob]) -> Option<f64> {
    let (sum, count) = finite_logprobs(tokens).fold((0.0, 0usize), |(s, n), lp| (s + lp, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Mean over every token of every sequence, pooled.
pub fn pooled_mean_logprob<'a, I>(sequences: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a [TokenLogprob]>,
{
    let (sum, count) = sequences
        .into_iter()
        .flat_map(finite_logprobs)
        .fold((0.0, 0usize), |(s, n), lp| (s + lp, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Average linear token probability across all samples, clamped to [0, 1].
pub fn score_confidence(samples: &[Sample]) -> Result<f64, MeasureError> {
    let (sum, count) = samples
        .iter()
        .flat_map(|s| s.token_logprobs.iter())
        .filter(|t| t.logprob.is_finite())
        .fold((0.0, 0usize), |(s, n), t| (s + t.probability(), n + 1));

    if count == 0 {
        return Err(MeasureError::DegenerateLogprob {
            phase: Phase::AnswerScoring,
            samples_collected: samples.len(),
        });
    }
    Ok((sum / count as f64).clamp(0.0, 1.0))
}

/// Mean of all answer token logprobs across samples.
pub fn score_answer_logprob(samples: &[Sample]) -> Result<f64, MeasureError> {
    pooled_mean_logprob(samples.iter().map(|s| s.token_logprobs.as_slice())).ok_or(
        MeasureError::DegenerateLogprob {
            phase: Phase::AnswerScoring,
            samples_collected: samples.len(),
        },
    )
}

/// Equal-weight mean of the per-phrase means; phrases without tokens are skipped.
pub fn aggregate_phrase_scores(
    scores: &[UncertaintyPhraseScore],
    samples_collected: usize,
) -> Result<f64, MeasureError> {
    let means: Vec<f64> = scores
        .iter()
        .filter_map(|s| s.mean_log_probability)
        .collect();

    if means.is_empty() {
        return Err(MeasureError::DegenerateLogprob {
            phase: Phase::PhraseScoring,
            samples_collected,
        });
    }
    Ok(means.iter().sum::<f64>() / means.len() as f64)
}

/// Scores reference phrases with one target-text completion each.
pub struct PhraseScorer<'a> {
    client: &'a dyn CompletionClient,
    retry: RetryPolicy,
    measurement_id: Uuid,
}

impl<'a> PhraseScorer<'a> {
    pub fn new(client: &'a dyn CompletionClient, retry: RetryPolicy, measurement_id: Uuid) -> Self {
        Self {
            client,
            retry,
            measurement_id,
        }
    }

    /// Any failed phrase fails the whole measurement: without every reference
    /// the denominator of the certainty ratio is not the one the threshold assumes.
    pub async fn score_phrase_logprobs(
        &self,
        phrases: &[&str],
        request: &SamplingRequest,
        samples_collected: usize,
    ) -> Result<Vec<UncertaintyPhraseScore>, MeasureError> {
        let mut scores = Vec::with_capacity(phrases.len());

        for phrase in phrases {
            let call =
                CompletionRequest::new(&request.prompt, request.temperature, request.max_tokens)
                    .target(*phrase)
                    .measurement(self.measurement_id);

            let (result, attempts) = complete_with_retry(self.client, &call, self.retry)
                .await
                .map_err(|(source, _)| MeasureError::PhraseScoring {
                    phrase: phrase.to_string(),
                    samples_collected,
                    source,
                })?;

            let mean = mean_logprob(&result.token_logprobs);
            debug!(phrase, attempts, mean = ?mean, "scored uncertainty phrase");

            scores.push(UncertaintyPhraseScore {
                phrase: phrase.to_string(),
                mean_log_probability: mean,
                token_count: result.token_logprobs.len(),
            });
        }

        Ok(scores)
    }
}
