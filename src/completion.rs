//! Completion client boundary.
//!
//! The measurement core only needs `(prompt, sampling parameters) -> (text, token
//! logprobs)`. [`CompletionClient`] is that seam; [`GatewayCompletionClient`]
//! implements it on top of a [`ChatGateway`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::gateway::{
    Attribution, ChatGateway, ChatModel, ChatRequest, Message, ProviderError, TokenLogprob,
};

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub logprobs: bool,
    /// When set, the client must return logprobs for exactly this text as if it
    /// were the completion, instead of sampling freely.
    pub target_text: Option<String>,
    /// Measurement this call belongs to, for usage attribution.
    pub measurement_id: Option<Uuid>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_tokens,
            logprobs: true,
            target_text: None,
            measurement_id: None,
        }
    }

    pub fn target(mut self, text: impl Into<String>) -> Self {
        self.target_text = Some(text.into());
        self
    }

    pub fn measurement(mut self, id: Uuid) -> Self {
        self.measurement_id = Some(id);
        self
    }
}

/// Text plus per-token logprobs, in generation order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub text: String,
    pub token_logprobs: Vec<TokenLogprob>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResult, ProviderError>;
}

/// Token budget for a forced-echo call: enough for the target plus slack.
const ECHO_MIN_TOKENS: u32 = 16;

/// [`CompletionClient`] backed by a chat gateway.
///
/// Free sampling sends the prompt as a single user turn. Target scoring uses a
/// forced echo: the model is told to reply with exactly the target text, and the
/// logprobs of the echoed tokens are returned. Chat endpoints don't score
/// arbitrary continuations, so this approximates scoring a fixed continuation.
/// Echo calls run at temperature 0, and a reply that is not the target is an
/// error rather than a score.
pub struct GatewayCompletionClient {
    gateway: Arc<dyn ChatGateway>,
    model: ChatModel,
}

impl GatewayCompletionClient {
    pub fn new(gateway: Arc<dyn ChatGateway>, model: ChatModel) -> Self {
        Self { gateway, model }
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    fn build_chat_request(&self, req: &CompletionRequest) -> ChatRequest {
        let (messages, caller, max_tokens, temperature) = match &req.target_text {
            Some(target) => (
                echo_messages(&req.prompt, target),
                "completion::score_target",
                echo_token_budget(target, req.max_tokens),
                0.0,
            ),
            None => (
                vec![Message::user(&req.prompt)],
                "completion::sample",
                req.max_tokens,
                req.temperature,
            ),
        };

        let mut attribution = Attribution::new(caller);
        if let Some(id) = req.measurement_id {
            attribution = attribution.with_measurement(id);
        }

        let chat = ChatRequest::new(self.model.clone(), messages, attribution)
            .temperature(temperature)
            .max_tokens(max_tokens);

        if req.logprobs {
            chat.with_logprobs()
        } else {
            chat
        }
    }
}

fn echo_messages(prompt: &str, target: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You will be shown a user message. Do not answer it. Reply with exactly the \
             following text and nothing else:\n{target}"
        )),
        Message::user(prompt),
    ]
}

fn echo_token_budget(target: &str, max_tokens: u32) -> u32 {
    // Roughly one token per 3 chars; never more than the caller allows.
    let estimate = (target.chars().count() as u32 / 3).max(1) + ECHO_MIN_TOKENS;
    estimate.min(max_tokens.max(1))
}

#[async_trait]
impl CompletionClient for GatewayCompletionClient {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResult, ProviderError> {
        let chat_req = self.build_chat_request(req);
        let resp = self.gateway.chat(chat_req).await?;

        if let Some(target) = &req.target_text {
            if resp.content.trim() != target.trim() {
                warn!(
                    model = self.model.model_id(),
                    target = %target,
                    reply = %resp.content,
                    "model did not echo the target text"
                );
                return Err(ProviderError::provider(
                    self.model.provider(),
                    format!(
                        "echo mismatch: expected {:?}, got {:?}",
                        target.trim(),
                        resp.content.trim()
                    ),
                    true,
                ));
            }
        }

        let token_logprobs = match resp.output_logprobs {
            Some(tokens) => tokens,
            None => {
                if req.logprobs {
                    warn!(
                        model = self.model.model_id(),
                        "provider returned no logprobs for a logprob request"
                    );
                }
                Vec::new()
            }
        };

        Ok(CompletionResult {
            text: resp.content,
            token_logprobs,
        })
    }
}
