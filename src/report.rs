//! Human-readable rendering of measurement results.

use crate::uncertainty::{MeasureError, UncertaintyReport};

const RULE_WIDTH: usize = 80;
const RESPONSE_PREVIEW_CHARS: usize = 200;

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

fn preview(text: &str) -> String {
    if text.chars().count() > RESPONSE_PREVIEW_CHARS {
        let cut: String = text.chars().take(RESPONSE_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

pub fn render_report_text(report: &UncertaintyReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\nUNCERTAINTY MEASUREMENT RESULTS\n{}\n", rule('='), rule('=')));
    out.push_str(&format!("\nPrompt: {}\n", report.prompt));
    out.push_str(&format!(
        "Samples: {} collected of {} requested\n",
        report.samples_collected, report.samples_requested
    ));

    out.push_str(&format!("\n{}\nUNCERTAINTY ANALYSIS\n{}\n", rule('-'), rule('-')));
    out.push_str(&format!("\nUncertainty Level: {}\n", report.uncertainty_level));
    out.push_str(&format!(
        "Response Diversity: {:.2} ({}/{} unique)\n",
        report.response_diversity, report.unique_responses, report.samples_collected
    ));
    out.push_str(&format!(
        "Average Token Confidence: {:.4}\n",
        report.average_token_confidence
    ));
    out.push_str(&format!(
        "Answer Mean Logprob: {:.4}\n",
        report.answer_mean_logprob
    ));
    out.push_str(&format!(
        "Uncertainty Phrase Mean Logprob: {:.4}\n",
        report.uncertainty_phrase_mean_logprob
    ));
    for score in &report.phrase_scores {
        match score.mean_log_probability {
            Some(mean) => out.push_str(&format!(
                "  - {:?}: {:.4} ({} tokens)\n",
                score.phrase, mean, score.token_count
            )),
            None => out.push_str(&format!("  - {:?}: no tokens\n", score.phrase)),
        }
    }
    out.push_str(&format!(
        "Certainty Ratio: {:.4} (threshold {})\n",
        report.certainty_ratio, report.uncertainty_threshold
    ));
    out.push_str(&format!(
        "Decision: {}\n",
        if report.is_uncertain { "UNCERTAIN" } else { "CONFIDENT" }
    ));
    out.push_str(&format!("\nRecommendation: {}\n", report.recommendation));
    out.push_str(&format!("Tool Response: {}\n", report.tool_response));

    out.push_str(&format!("\n{}\nINDIVIDUAL RESPONSES\n{}\n", rule('-'), rule('-')));
    for (i, response) in report.responses.iter().enumerate() {
        out.push_str(&format!("\nResponse {}:\n{}\n", i + 1, preview(response)));
    }
    out.push_str(&format!("\n{}\n", rule('=')));
    out
}

/// Explicit failure output; no partial analysis is shown.
pub fn render_failure(err: &MeasureError) -> String {
    let mut out = format!(
        "Uncertainty measurement failed during {} ({}): {}\n",
        err.phase(),
        err.code(),
        err
    );
    out.push_str(&format!("Samples collected: {}\n", err.samples_collected()));
    if let MeasureError::AllSamplesFailed { failures, .. } = err {
        for failure in failures {
            out.push_str(&format!(
                "  - sample {} after {} attempt(s): {} ({})\n",
                failure.index + 1,
                failure.attempts,
                failure.message,
                failure.code
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uncertainty::{Phase, SampleFailure, UncertaintyLevel, UncertaintyPhraseScore};

    fn report() -> UncertaintyReport {
        UncertaintyReport {
            prompt: "Capital of France?".into(),
            responses: vec!["Paris".into(), "x".repeat(250)],
            samples_requested: 3,
            samples_collected: 2,
            unique_responses: 2,
            response_diversity: 1.0,
            average_token_confidence: 0.95,
            answer_mean_logprob: -0.05,
            phrase_scores: vec![UncertaintyPhraseScore {
                phrase: "I'm not sure".into(),
                mean_log_probability: Some(-2.0),
                token_count: 4,
            }],
            uncertainty_phrase_mean_logprob: -2.0,
            certainty_ratio: 0.025,
            uncertainty_threshold: 1.0,
            uncertainty_level: UncertaintyLevel::High,
            is_uncertain: false,
            recommendation: "verify".into(),
            tool_response: "Paris".into(),
        }
    }

    #[test]
    fn text_report_lists_every_section() {
        let text = render_report_text(&report());
        assert!(text.contains("Prompt: Capital of France?"));
        assert!(text.contains("2 collected of 3 requested"));
        assert!(text.contains("Uncertainty Level: HIGH"));
        assert!(text.contains("(2/2 unique)"));
        assert!(text.contains("Certainty Ratio: 0.0250 (threshold 1)"));
        assert!(text.contains("Decision: CONFIDENT"));
        assert!(text.contains("Tool Response: Paris"));
        assert!(text.contains("Response 2:"));
    }

    #[test]
    fn long_responses_are_truncated() {
        let text = render_report_text(&report());
        assert!(text.contains(&format!("{}...", "x".repeat(200))));
        assert!(!text.contains(&"x".repeat(201)));
    }

    #[test]
    fn failure_names_phase_and_attempts() {
        let err = MeasureError::AllSamplesFailed {
            requested: 1,
            failures: vec![SampleFailure {
                index: 0,
                attempts: 3,
                code: "timeout",
                message: "request timed out".into(),
            }],
        };
        let text = render_failure(&err);
        assert!(text.contains("during sampling (all_samples_failed)"));
        assert!(text.contains("sample 1 after 3 attempt(s)"));

        let err = MeasureError::DegenerateLogprob {
            phase: Phase::AnswerScoring,
            samples_collected: 4,
        };
        assert!(render_failure(&err).contains("Samples collected: 4"));
    }
}
