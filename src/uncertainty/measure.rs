//! End-to-end measurement: sample, score, decide, report.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::completion::CompletionClient;

use super::confidence::{aggregate_phrase_scores, score_answer_logprob, score_confidence, PhraseScorer};
use super::decision::{decide, recommendation, tool_response};
use super::diversity::analyze_diversity;
use super::error::MeasureError;
use super::options::MeasureConfig;
use super::sampler::Sampler;
use super::types::{SamplingRequest, UncertaintyReport, UNCERTAINTY_PHRASES};

/// Owns a completion client and measurement settings.
///
/// Holds no per-measurement state; concurrent `measure` calls are independent.
#[derive(Clone)]
pub struct UncertaintyMeasurer {
    client: Arc<dyn CompletionClient>,
    config: MeasureConfig,
}

impl UncertaintyMeasurer {
    pub fn new(client: Arc<dyn CompletionClient>, config: MeasureConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &MeasureConfig {
        &self.config
    }

    pub async fn measure(&self, request: &SamplingRequest) -> Result<UncertaintyReport, MeasureError> {
        measure(self.client.as_ref(), &self.config, request).await
    }
}

/// Run one measurement.
///
/// Validation happens before any completion call. On success every report field
/// is populated; on failure nothing partial is returned.
pub async fn measure(
    client: &dyn CompletionClient,
    config: &MeasureConfig,
    request: &SamplingRequest,
) -> Result<UncertaintyReport, MeasureError> {
    request.validate()?;

    let measurement_id = Uuid::new_v4();
    info!(
        %measurement_id,
        num_samples = request.num_samples,
        temperature = request.temperature,
        threshold = request.uncertainty_threshold,
        "measuring uncertainty"
    );

    let set = Sampler::new(client, config.retry)
        .parallelism(config.parallelism)
        .sample(request, measurement_id)
        .await?;
    let collected = set.collected();
    if !set.failures.is_empty() {
        info!(
            %measurement_id,
            requested = set.requested,
            collected,
            "continuing with partial samples"
        );
    }

    let diversity = analyze_diversity(&set.samples);
    let average_token_confidence = score_confidence(&set.samples)?;
    let answer_mean_logprob = score_answer_logprob(&set.samples)?;
    debug!(
        %measurement_id,
        diversity = diversity.response_diversity,
        average_token_confidence,
        answer_mean_logprob,
        "scored samples"
    );

    let phrase_scores = PhraseScorer::new(client, config.retry, measurement_id)
        .score_phrase_logprobs(&UNCERTAINTY_PHRASES, request, collected)
        .await?;
    let uncertainty_phrase_mean_logprob = aggregate_phrase_scores(&phrase_scores, collected)?;

    let decision = decide(
        answer_mean_logprob,
        uncertainty_phrase_mean_logprob,
        request.uncertainty_threshold,
        collected,
    )?;

    let tool_response = tool_response(&set.samples, &request.prompt, decision.is_uncertain);

    info!(
        %measurement_id,
        level = %diversity.level,
        certainty_ratio = decision.certainty_ratio,
        is_uncertain = decision.is_uncertain,
        "measurement complete"
    );

    Ok(UncertaintyReport {
        prompt: request.prompt.clone(),
        responses: set.samples.iter().map(|s| s.text.clone()).collect(),
        samples_requested: set.requested,
        samples_collected: collected,
        unique_responses: diversity.unique_responses,
        response_diversity: diversity.response_diversity,
        average_token_confidence,
        answer_mean_logprob,
        phrase_scores,
        uncertainty_phrase_mean_logprob,
        certainty_ratio: decision.certainty_ratio,
        uncertainty_threshold: request.uncertainty_threshold,
        uncertainty_level: diversity.level,
        is_uncertain: decision.is_uncertain,
        recommendation: recommendation(diversity.level, decision.is_uncertain).to_string(),
        tool_response,
    })
}
