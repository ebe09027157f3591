//! Heuristic request-complexity scoring
//!
//! Deterministic, message-content-only scoring in [0.0, 1.0]. Four capped
//! terms: character volume, question marks, technical indicators, creative
//! indicators. The score only routes between cost tiers, so the heuristic
//! errs coarse rather than clever.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::types::{Message, Tier};

const EMPTY_INPUT_SCORE: f64 = 0.1;
const CHEAP_BELOW: f64 = 0.3;
const STANDARD_BELOW: f64 = 0.7;
const ESCALATION_THRESHOLD: f64 = 0.8;

const TECHNICAL_KEYWORDS: [&str; 4] = ["function", "class", "algorithm", "database"];
const CREATIVE_KEYWORDS: [&str; 4] = ["story", "creative", "poem", "article"];

const LOW_CONFIDENCE_PHRASES: [&str; 7] = [
    "i am not sure",
    "i cannot",
    "i do not know",
    "i am uncertain",
    "cannot reliably",
    "not confident",
    "i do not have enough information",
];

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[\s\S]*?```").expect("valid code block pattern"));

/// Score a conversation's complexity in [0.0, 1.0]
pub fn estimate_complexity(messages: &[Message]) -> f64 {
    if messages.is_empty() {
        return EMPTY_INPUT_SCORE;
    }

    let mut score = 0.0;

    let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
    score += (total_chars as f64 / 5000.0).min(0.4);

    let questions: usize = messages
        .iter()
        .map(|m| m.content.matches('?').count())
        .sum();
    score += (questions as f64 * 0.1).min(0.2);

    let technical: usize = messages
        .iter()
        .map(|m| {
            let lower = m.content.to_lowercase();
            let keywords: usize = TECHNICAL_KEYWORDS
                .iter()
                .map(|kw| lower.matches(kw).count())
                .sum();
            keywords + CODE_BLOCK.find_iter(&m.content).count()
        })
        .sum();
    score += (technical as f64 * 0.05).min(0.2);

    let creative: usize = messages
        .iter()
        .map(|m| {
            let lower = m.content.to_lowercase();
            CREATIVE_KEYWORDS
                .iter()
                .map(|kw| lower.matches(kw).count())
                .sum::<usize>()
        })
        .sum();
    score += (creative as f64 * 0.05).min(0.2);

    score.min(1.0)
}

/// Map a complexity score onto a cost tier
pub fn complexity_to_tier(complexity: f64) -> Tier {
    if complexity < CHEAP_BELOW {
        Tier::Cheap
    } else if complexity < STANDARD_BELOW {
        Tier::Standard
    } else {
        Tier::Premium
    }
}

/// Does model output hedge in a way that warrants a stronger model
pub fn is_low_confidence(response: &str) -> bool {
    let lower = response.to_lowercase();
    LOW_CONFIDENCE_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

/// Escalate on hedging output or on a request near the top of the scale
pub fn should_escalate(response: &str, complexity: f64) -> bool {
    is_low_confidence(response) || complexity > ESCALATION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_messages_score_low() {
        assert_eq!(estimate_complexity(&[]), EMPTY_INPUT_SCORE);
        assert_eq!(complexity_to_tier(estimate_complexity(&[])), Tier::Cheap);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let huge = Message::user(format!(
            "{} function class algorithm database story poem ??????",
            "x".repeat(50_000)
        ));
        let score = estimate_complexity(&[huge]);
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn score_is_monotone_in_each_term() {
        let base = estimate_complexity(&[Message::user("write about dogs")]);
        let longer = estimate_complexity(&[Message::user(format!(
            "write about dogs {}",
            "and their habits ".repeat(50)
        ))]);
        assert!(longer > base);

        let with_question = estimate_complexity(&[Message::user("write about dogs?")]);
        assert!(with_question > base);

        let technical = estimate_complexity(&[Message::user("write a function about dogs")]);
        assert!(technical > base);

        let creative = estimate_complexity(&[Message::user("write a story about dogs")]);
        assert!(creative > base);
    }

    #[test]
    fn code_blocks_count_as_technical() {
        let without = estimate_complexity(&[Message::user("explain this snippet")]);
        let with = estimate_complexity(&[Message::user(
            "explain this snippet ```\nlet x = 1;\n```",
        )]);
        assert!(with > without);
    }

    #[test]
    fn tier_mapping_partitions_the_interval() {
        assert_eq!(complexity_to_tier(0.0), Tier::Cheap);
        assert_eq!(complexity_to_tier(0.29), Tier::Cheap);
        assert_eq!(complexity_to_tier(0.3), Tier::Standard);
        assert_eq!(complexity_to_tier(0.69), Tier::Standard);
        assert_eq!(complexity_to_tier(0.7), Tier::Premium);
        assert_eq!(complexity_to_tier(1.0), Tier::Premium);
    }

    #[test]
    fn low_confidence_detection_is_case_insensitive() {
        assert!(is_low_confidence("I am NOT sure this is right."));
        assert!(is_low_confidence("Unfortunately I cannot verify this."));
        assert!(!is_low_confidence("The answer is 42."));
    }

    #[test]
    fn escalation_triggers_on_either_condition() {
        assert!(should_escalate("I am not sure", 0.2));
        assert!(should_escalate("confident answer", 0.85));
        assert!(!should_escalate("confident answer", 0.5));
    }
}
