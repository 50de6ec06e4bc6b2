//! Chat model pricing for usage attribution.
//!
//! Costs are in nanodollars (1e-9 USD) per token.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Pricing information for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    /// Cost per input token in nanodollars.
    pub input_nanos_per_token: i64,
    /// Cost per output token in nanodollars.
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn new(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        (input_tokens as i64) * self.input_nanos_per_token
            + (output_tokens as i64) * self.output_nanos_per_token
    }
}

// Only models that return token logprobs are listed; verify against the
// provider's pricing page when adding entries.
// gpt-4: $30.00/1M input, $60.00/1M output
// gpt-4-turbo: $10.00/1M input, $30.00/1M output
// gpt-4o: $2.50/1M input, $10.00/1M output
// gpt-4o-mini: $0.15/1M input, $0.60/1M output
// gpt-4.1-mini: $0.40/1M input, $1.60/1M output

const GPT_4: ModelPricing = ModelPricing::new(30_000, 60_000);
const GPT_4_TURBO: ModelPricing = ModelPricing::new(10_000, 30_000);
const GPT_4O: ModelPricing = ModelPricing::new(2_500, 10_000);
const GPT_4O_MINI: ModelPricing = ModelPricing::new(150, 600);
const GPT_4_1_MINI: ModelPricing = ModelPricing::new(400, 1_600);

/// Fallback for unknown models.
const UNKNOWN: ModelPricing = ModelPricing::new(1_000, 5_000);

static PRICING_MAP: OnceLock<HashMap<&'static str, ModelPricing>> = OnceLock::new();

fn init_pricing() -> HashMap<&'static str, ModelPricing> {
    let mut map = HashMap::new();
    map.insert("gpt-4", GPT_4);
    map.insert("gpt-4-turbo", GPT_4_TURBO);
    map.insert("gpt-4o", GPT_4O);
    map.insert("gpt-4o-2024-08-06", GPT_4O);
    map.insert("gpt-4o-mini", GPT_4O_MINI);
    map.insert("gpt-4o-mini-2024-07-18", GPT_4O_MINI);
    map.insert("gpt-4.1-mini", GPT_4_1_MINI);
    map
}

pub fn get_pricing(model_id: &str) -> Option<ModelPricing> {
    PRICING_MAP.get_or_init(init_pricing).get(model_id).copied()
}

/// Chat cost in nanodollars, priced as a mid-range model when unknown.
pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    get_pricing(model)
        .unwrap_or(UNKNOWN)
        .calculate_cost(input_tokens, output_tokens)
}
