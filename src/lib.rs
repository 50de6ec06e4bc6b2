#![forbid(unsafe_code)]

//! # uncertainty-harness
//!
//! Tells you when an LLM doesn't know.
//!
//! A prompt is sampled several times with token logprobs. Two signals come out:
//! how much the sampled answers disagree with each other (response diversity),
//! and how probable the answer tokens are compared with fixed hedging phrases
//! such as "I'm not sure" (the certainty ratio). The ratio is compared against a
//! user threshold to decide whether to return the answer or ask for clarification.

pub mod completion;
pub mod gateway;
pub mod orchestrator;
pub mod report;
pub mod tool;
pub mod uncertainty;

pub use completion::{CompletionClient, CompletionRequest, CompletionResult, GatewayCompletionClient};
pub use gateway::{Attribution, ChatGateway, ProviderError, ProviderGateway, UsageSink};
pub use orchestrator::{Conversation, Orchestrator, OrchestratorError, TurnOutcome};
pub use report::{render_failure, render_report_text};
pub use tool::{measure_uncertainty_schema, parse_arguments, ToolArgsError};
pub use uncertainty::{
    measure, MeasureConfig, MeasureError, SamplingRequest, UncertaintyLevel, UncertaintyMeasurer,
    UncertaintyReport,
};
