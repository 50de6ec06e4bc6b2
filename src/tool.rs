//! `measure_uncertainty` function-calling surface: schema and argument parsing.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::uncertainty::{
    MeasureError, SamplingRequest, DEFAULT_NUM_SAMPLES, DEFAULT_THRESHOLD,
};

pub const TOOL_NAME: &str = "measure_uncertainty";

/// Tool definition in the OpenAI `tools` format.
pub fn measure_uncertainty_schema() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Measures uncertainty in LLM responses by sampling the model several times \
                            and comparing answer token logprobs against fixed hedging phrases.",
            "parameters": {
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The user's question or prompt to analyze for uncertainty"
                    },
                    "num_samples": {
                        "type": "integer",
                        "description": "Number of completions to sample",
                        "default": DEFAULT_NUM_SAMPLES
                    },
                    "temperature": {
                        "type": "number",
                        "description": "Sampling temperature; higher values produce more diverse responses",
                        "default": 0.7
                    },
                    "uncertainty_threshold": {
                        "type": "number",
                        "description": "Certainty ratio (answer mean logprob / hedging phrase mean logprob) \
                                        above which the answer is uncertain. Typical values: 0.8-1.2",
                        "default": DEFAULT_THRESHOLD
                    }
                },
                "required": ["prompt"]
            }
        }
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ToolArgsError {
    #[error("malformed tool arguments: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] MeasureError),
}

/// Arguments as a model would send them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeasureUncertaintyArgs {
    pub prompt: String,
    #[serde(default)]
    pub num_samples: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub uncertainty_threshold: Option<f64>,
}

impl MeasureUncertaintyArgs {
    /// A user-configured threshold always wins over the model-supplied one.
    pub fn into_request(self, user_threshold: Option<f64>) -> SamplingRequest {
        let mut request = SamplingRequest::new(self.prompt);
        if let Some(n) = self.num_samples {
            request = request.num_samples(n);
        }
        if let Some(t) = self.temperature {
            request = request.temperature(t);
        }
        if let Some(threshold) = user_threshold.or(self.uncertainty_threshold) {
            request = request.threshold(threshold);
        }
        request
    }
}

/// Parse and validate a tool-call `arguments` string.
pub fn parse_arguments(
    arguments: &str,
    user_threshold: Option<f64>,
) -> Result<SamplingRequest, ToolArgsError> {
    let args: MeasureUncertaintyArgs = serde_json::from_str(arguments)?;
    let request = args.into_request(user_threshold);
    request.validate()?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_declares_defaults_and_required_prompt() {
        let schema = measure_uncertainty_schema();
        let function = &schema["function"];
        assert_eq!(function["name"], "measure_uncertainty");

        let params = &function["parameters"];
        assert_eq!(params["required"], json!(["prompt"]));
        assert_eq!(params["properties"]["num_samples"]["default"], 5);
        assert_eq!(params["properties"]["uncertainty_threshold"]["default"], 1.0);
        let temperature = params["properties"]["temperature"]["default"].as_f64().unwrap();
        assert!((temperature - f64::from(crate::uncertainty::DEFAULT_TEMPERATURE)).abs() < 1e-6);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let request = parse_arguments(r#"{"prompt":"Capital of France?"}"#, None).unwrap();
        assert_eq!(request, SamplingRequest::new("Capital of France?"));
    }

    #[test]
    fn user_threshold_overrides_model_threshold() {
        let args = r#"{"prompt":"q","num_samples":3,"temperature":1.0,"uncertainty_threshold":0.2}"#;

        let request = parse_arguments(args, Some(1.1)).unwrap();
        assert_eq!(request.uncertainty_threshold, 1.1);
        assert_eq!(request.num_samples, 3);

        let request = parse_arguments(args, None).unwrap();
        assert_eq!(request.uncertainty_threshold, 0.2);
    }

    #[test]
    fn malformed_and_invalid_arguments_are_rejected() {
        assert!(matches!(
            parse_arguments(r#"{"num_samples":3}"#, None),
            Err(ToolArgsError::Json(_))
        ));
        assert!(matches!(
            parse_arguments("not json", None),
            Err(ToolArgsError::Json(_))
        ));
        assert!(matches!(
            parse_arguments(r#"{"prompt":"q","num_samples":0}"#, None),
            Err(ToolArgsError::Invalid(MeasureError::InvalidRequest(_)))
        ));
    }
}
