//! Response diversity: the share of distinct answers among the samples.
//!
//! Comparison is exact string equality after trimming whitespace. Paraphrases of
//! the same answer therefore count as distinct.

use std::collections::HashSet;

use super::types::{Sample, UncertaintyLevel};

/// Diversity below this is LOW.
pub const MEDIUM_DIVERSITY: f64 = 0.4;
/// Diversity at or above this is HIGH.
pub const HIGH_DIVERSITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiversityAnalysis {
    pub unique_responses: usize,
    pub total_samples: usize,
    /// `unique_responses / total_samples`, in [0, 1].
    pub response_diversity: f64,
    pub level: UncertaintyLevel,
}

pub(crate) fn normalize(text: &str) -> &str {
    text.trim()
}

pub fn analyze_diversity(samples: &[Sample]) -> DiversityAnalysis {
    let unique: HashSet<&str> = samples.iter().map(|s| normalize(&s.text)).collect();
    let total = samples.len();
    let diversity = if total == 0 {
        0.0
    } else {
        unique.len() as f64 / total as f64
    };

    DiversityAnalysis {
        unique_responses: unique.len(),
        total_samples: total,
        response_diversity: diversity,
        level: level_for_diversity(diversity),
    }
}

pub fn level_for_diversity(diversity: f64) -> UncertaintyLevel {
    if diversity >= HIGH_DIVERSITY {
        UncertaintyLevel::High
    } else if diversity >= MEDIUM_DIVERSITY {
        UncertaintyLevel::Medium
    } else {
        UncertaintyLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(texts: &[&str]) -> Vec<Sample> {
        texts.iter().map(|t| Sample::new(*t, Vec::new())).collect()
    }

    #[test]
    fn two_distinct_of_five_is_medium_boundary() {
        let analysis = analyze_diversity(&samples(&["A", "A", "B", "A", "B"]));
        assert_eq!(analysis.unique_responses, 2);
        assert!((analysis.response_diversity - 0.4).abs() < 1e-12);
        assert_eq!(analysis.level, UncertaintyLevel::Medium);
    }

    #[test]
    fn identical_responses_are_low() {
        let analysis = analyze_diversity(&samples(&["Paris"; 5]));
        assert_eq!(analysis.unique_responses, 1);
        // One distinct answer still counts once: 1 / 5.
        assert!((analysis.response_diversity - 0.2).abs() < 1e-12);
        assert_eq!(analysis.level, UncertaintyLevel::Low);
    }

    #[test]
    fn all_distinct_is_high() {
        let analysis = analyze_diversity(&samples(&["1", "2", "3", "4", "5"]));
        assert_eq!(analysis.response_diversity, 1.0);
        assert_eq!(analysis.level, UncertaintyLevel::High);
    }

    #[test]
    fn three_distinct_of_five_is_medium() {
        let analysis = analyze_diversity(&samples(&[
            "Answer A", "Answer A", "Answer B", "Answer C", "Answer A",
        ]));
        assert_eq!(analysis.unique_responses, 3);
        assert_eq!(analysis.level, UncertaintyLevel::Medium);
    }

    #[test]
    fn single_sample_counts_as_fully_diverse() {
        let analysis = analyze_diversity(&samples(&["Paris"]));
        assert_eq!(analysis.response_diversity, 1.0);
        assert_eq!(analysis.level, UncertaintyLevel::High);
    }

    #[test]
    fn whitespace_is_trimmed_but_case_is_not() {
        let analysis = analyze_diversity(&samples(&["Paris", " Paris\n", "paris"]));
        assert_eq!(analysis.unique_responses, 2);
    }

    #[test]
    fn level_boundaries() {
        assert_eq!(level_for_diversity(0.0), UncertaintyLevel::Low);
        assert_eq!(level_for_diversity(0.399), UncertaintyLevel::Low);
        assert_eq!(level_for_diversity(0.4), UncertaintyLevel::Medium);
        assert_eq!(level_for_diversity(0.799), UncertaintyLevel::Medium);
        assert_eq!(level_for_diversity(0.8), UncertaintyLevel::High);
    }

    #[test]
    fn diversity_stays_in_unit_interval() {
        for n in 1..8 {
            let texts: Vec<String> = (0..n).map(|i| format!("{}", i % 3)).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let analysis = analyze_diversity(&samples(&refs));
            assert!((0.0..=1.0).contains(&analysis.response_diversity));
            assert!(analysis.unique_responses <= n);
        }
    }
}
