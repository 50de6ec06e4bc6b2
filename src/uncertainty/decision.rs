//! Certainty ratio, decision rule, recommendation and tool response.
//!
//! `certainty_ratio = answer_mean_logprob / uncertainty_phrase_mean_logprob`.
//! Both are <= 0, so a ratio near 0 means the sampled answer is far more probable
//! than a hedge like "I'm not sure": lower is more confident. A measurement is
//! uncertain when the ratio is strictly above the threshold.

use std::collections::HashMap;

use super::diversity::normalize;
use super::error::{MeasureError, Phase};
use super::types::{Sample, UncertaintyLevel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub certainty_ratio: f64,
    pub is_uncertain: bool,
}

pub fn decide(
    answer_mean_logprob: f64,
    uncertainty_phrase_mean_logprob: f64,
    threshold: f64,
    samples_collected: usize,
) -> Result<Decision, MeasureError> {
    if uncertainty_phrase_mean_logprob == 0.0 || !uncertainty_phrase_mean_logprob.is_finite() {
        return Err(MeasureError::DegenerateLogprob {
            phase: Phase::PhraseScoring,
            samples_collected,
        });
    }

    let certainty_ratio = answer_mean_logprob / uncertainty_phrase_mean_logprob;
    Ok(Decision {
        certainty_ratio,
        is_uncertain: certainty_ratio > threshold,
    })
}

pub fn recommendation(level: UncertaintyLevel, is_uncertain: bool) -> &'static str {
    match (level, is_uncertain) {
        (UncertaintyLevel::Low, false) => "The model appears confident in its response.",
        (UncertaintyLevel::Low, true) => {
            "The sampled answers agree, but they are less likely than a hedging reply. \
             Ask the user to clarify before relying on the answer."
        }
        (UncertaintyLevel::Medium, false) => {
            "The model is fairly confident, but its answers vary between samples. \
             The response is likely usable; verify key details."
        }
        (UncertaintyLevel::Medium, true) => {
            "The model shows some uncertainty. Verify the response or ask the user for clarification."
        }
        (UncertaintyLevel::High, false) => {
            "Token confidence is high, yet every sample says something different. \
             Verify the response before relying on it."
        }
        (UncertaintyLevel::High, true) => {
            "The model is highly uncertain. Consider reformulating the question or providing more context."
        }
    }
}

/// Most frequent trimmed response; ties go to the earliest occurrence.
pub fn most_representative(samples: &[Sample]) -> Option<&str> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, sample) in samples.iter().enumerate() {
        let entry = counts.entry(normalize(&sample.text)).or_insert((0, index));
        entry.0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(text, _)| text)
}

const TOPIC_MAX_CHARS: usize = 80;

/// Clarification request naming the prompt topic.
pub fn clarification_request(prompt: &str) -> String {
    let topic = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    let topic = if topic.chars().count() > TOPIC_MAX_CHARS {
        let cut: String = topic.chars().take(TOPIC_MAX_CHARS).collect();
        format!("{}...", cut.trim_end())
    } else {
        topic
    };

    format!(
        "I'm not confident I can answer \"{topic}\" reliably. Could you clarify what you \
         are asking, or share more context?"
    )
}

pub fn tool_response(samples: &[Sample], prompt: &str, is_uncertain: bool) -> String {
    if is_uncertain {
        return clarification_request(prompt);
    }
    match most_representative(samples) {
        Some(text) => text.to_string(),
        None => clarification_request(prompt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(texts: &[&str]) -> Vec<Sample> {
        texts.iter().map(|t| Sample::new(*t, Vec::new())).collect()
    }

    #[test]
    fn ratio_polarity_confident_answer_is_below_threshold() {
        let decision = decide(-0.05, -2.0, 1.0, 5).unwrap();
        assert!((decision.certainty_ratio - 0.025).abs() < 1e-9);
        assert!(!decision.is_uncertain, "a low ratio is the confident branch");
    }

    #[test]
    fn ratio_above_threshold_is_uncertain() {
        // Answer tokens are less likely than the hedging phrases.
        let decision = decide(-2.5, -2.0, 1.0, 5).unwrap();
        assert!((decision.certainty_ratio - 1.25).abs() < 1e-9);
        assert!(decision.is_uncertain);
    }

    #[test]
    fn ratio_equal_to_threshold_is_confident() {
        let decision = decide(-2.0, -2.0, 1.0, 5).unwrap();
        assert_eq!(decision.certainty_ratio, 1.0);
        assert!(!decision.is_uncertain);
    }

    #[test]
    fn threshold_moves_the_boundary() {
        let decision = decide(-0.9, -1.0, 0.5, 5).unwrap();
        assert!(decision.is_uncertain);
        let decision = decide(-0.9, -1.0, 1.2, 5).unwrap();
        assert!(!decision.is_uncertain);
    }

    #[test]
    fn zero_phrase_mean_is_degenerate() {
        let err = decide(-0.5, 0.0, 1.0, 3).unwrap_err();
        assert!(matches!(
            err,
            MeasureError::DegenerateLogprob {
                phase: Phase::PhraseScoring,
                samples_collected: 3
            }
        ));
    }

    #[test]
    fn perfectly_certain_answer_has_zero_ratio() {
        let decision = decide(0.0, -2.0, 1.0, 5).unwrap();
        assert_eq!(decision.certainty_ratio, 0.0);
        assert!(!decision.is_uncertain);
    }

    #[test]
    fn representative_answer_is_most_frequent() {
        let s = samples(&["B", "A", "B", "C"]);
        assert_eq!(most_representative(&s), Some("B"));
    }

    #[test]
    fn representative_ties_break_on_earliest_occurrence() {
        let s = samples(&["C", "A", "A", "C", "B"]);
        assert_eq!(most_representative(&s), Some("C"));
        let s = samples(&["x", "y", "z"]);
        assert_eq!(most_representative(&s), Some("x"));
    }

    #[test]
    fn representative_answer_is_trimmed() {
        let s = samples(&[" Paris\n", "Paris"]);
        assert_eq!(most_representative(&s), Some("Paris"));
        assert_eq!(most_representative(&[]), None);
    }

    #[test]
    fn tool_response_by_branch() {
        let s = samples(&["Paris", "Paris", "Lyon"]);
        assert_eq!(tool_response(&s, "Capital of France?", false), "Paris");

        let clarification = tool_response(&s, "Capital of France?", true);
        assert!(clarification.contains("\"Capital of France?\""));
        assert!(clarification.to_lowercase().contains("clarify"));
    }

    #[test]
    fn clarification_truncates_long_topics() {
        let prompt = "word ".repeat(50);
        let text = clarification_request(&prompt);
        assert!(text.contains("..."));
        assert!(text.len() < prompt.len() + 100);
    }

    #[test]
    fn recommendations_are_distinct_and_deterministic() {
        let levels = [UncertaintyLevel::Low, UncertaintyLevel::Medium, UncertaintyLevel::High];
        let mut seen = std::collections::HashSet::new();
        for level in levels {
            for uncertain in [false, true] {
                assert_eq!(recommendation(level, uncertain), recommendation(level, uncertain));
                assert!(seen.insert(recommendation(level, uncertain)));
            }
        }
        assert!(recommendation(UncertaintyLevel::Low, false).contains("confident"));
        assert!(recommendation(UncertaintyLevel::High, true).contains("uncertain"));
    }
}
