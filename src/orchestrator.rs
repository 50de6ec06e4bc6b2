//! Uncertainty-aware chat turns.
//!
//! Every user message is measured before the assistant answers; the measurement
//! result is handed to the chat model as tool output embedded in the system
//! prompt, and the model writes the final reply with that analysis in view.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, Message, ProviderError};
use crate::tool::TOOL_NAME;
use crate::uncertainty::{
    MeasureError, SamplingRequest, UncertaintyMeasurer, UncertaintyReport, DEFAULT_NUM_SAMPLES,
    DEFAULT_TEMPERATURE, DEFAULT_THRESHOLD,
};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("uncertainty measurement failed: {0}")]
    Measure(#[from] MeasureError),

    #[error("final answer call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Caller-owned chat history (user and assistant turns only).
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub report: UncertaintyReport,
    /// `{analysis, is_uncertain, tool_response}` as given to the chat model.
    pub tool_payload: Value,
    pub assistant_response: String,
}

pub struct Orchestrator {
    measurer: UncertaintyMeasurer,
    gateway: Arc<dyn ChatGateway>,
    model: ChatModel,
    threshold: f64,
    num_samples: usize,
    temperature: f32,
}

impl Orchestrator {
    pub fn new(measurer: UncertaintyMeasurer, gateway: Arc<dyn ChatGateway>, model: ChatModel) -> Self {
        Self {
            measurer,
            gateway,
            model,
            threshold: DEFAULT_THRESHOLD,
            num_samples: DEFAULT_NUM_SAMPLES,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// User-configured threshold, applied to every measurement.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn current_threshold(&self) -> f64 {
        self.threshold
    }

    /// Run one turn. On error the conversation is left as it was before the call.
    pub async fn respond(
        &self,
        conversation: &mut Conversation,
        user_message: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        conversation.turns.push(Message::user(user_message));

        match self.run_turn(conversation, user_message).await {
            Ok(outcome) => {
                conversation
                    .turns
                    .push(Message::assistant(&outcome.assistant_response));
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, "turn failed; dropping user message from history");
                conversation.turns.pop();
                Err(err)
            }
        }
    }

    async fn run_turn(
        &self,
        conversation: &Conversation,
        user_message: &str,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let request = SamplingRequest::new(user_message)
            .num_samples(self.num_samples)
            .temperature(self.temperature)
            .threshold(self.threshold);
        let report = self.measurer.measure(&request).await?;
        let tool_payload = tool_payload(&report);

        let mut messages = vec![Message::system(system_prompt(self.threshold, &tool_payload))];
        messages.extend(conversation.turns.iter().cloned());

        let chat = ChatRequest::new(
            self.model.clone(),
            messages,
            Attribution::new("orchestrator::respond"),
        );
        let resp = self.gateway.chat(chat).await?;

        info!(
            is_uncertain = report.is_uncertain,
            level = %report.uncertainty_level,
            "turn answered"
        );

        Ok(TurnOutcome {
            report,
            tool_payload,
            assistant_response: resp.content,
        })
    }
}

/// Tool output handed to the chat model.
pub fn tool_payload(report: &UncertaintyReport) -> Value {
    json!({
        "analysis": {
            "uncertainty_level": report.uncertainty_level,
            "response_diversity": report.response_diversity,
            "unique_responses": report.unique_responses,
            "total_samples": report.samples_collected,
            "average_token_confidence": report.average_token_confidence,
            "certainty_ratio": report.certainty_ratio,
            "uncertainty_threshold": report.uncertainty_threshold,
            "recommendation": report.recommendation,
        },
        "is_uncertain": report.is_uncertain,
        "tool_response": report.tool_response,
    })
}

fn system_prompt(threshold: f64, payload: &Value) -> String {
    format!(
        "You are an uncertainty-aware AI assistant. The '{TOOL_NAME}' tool has already been run \
         on the latest user message with uncertainty_threshold={threshold}. Its result:\n{payload}\n\
         Answer the user, incorporating this analysis. If is_uncertain is true, do not state the \
         answer as fact; ask for the clarification given in tool_response."
    )
}
