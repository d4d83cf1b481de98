//! Passphrase strength scoring.
//!
//! A pure function of the passphrase text. It has no dependency on the
//! session and never sees derived keys.

use serde::Serialize;

/// Highest score a passphrase can reach.
pub const MAX_SCORE: u8 = 4;

const MIN_LENGTH: usize = 8;
const GOOD_LENGTH: usize = 12;
const LONG_LENGTH: usize = 16;

/// Trivial prefixes, compared case-insensitively.
const COMMON_PREFIXES: &[&str] = &["012", "123", "234", "abc", "qwerty", "password"];

const REMARK_TOO_SHORT: &str = "Use at least 8 characters";
const REMARK_FEW_CLASSES: &str = "Mix at least three of: lowercase, uppercase, digits, symbols";
const REMARK_REPEATED: &str = "Avoid repeating a single character";
const REMARK_COMMON: &str = "Avoid common patterns like \"123\" or \"password\"";
const REMARK_STRONG: &str = "Strong passphrase";

/// Score and feedback for one passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrengthAssessment {
    /// 0 (weakest) to 4.
    pub score: u8,
    /// Actionable remarks, or a single positive remark when nothing was flagged.
    pub feedback: Vec<String>,
}

/// Score a passphrase.
///
/// Credits: one for 12+ characters and another for 16+; one for three
/// character classes and another for all four. A common prefix costs two
/// credits, and a single repeated character forces the score to zero.
pub fn score(passphrase: &str) -> StrengthAssessment {
    let mut credits: i32 = 0;
    let mut feedback = Vec::new();

    let length = passphrase.chars().count();
    if length < MIN_LENGTH {
        feedback.push(REMARK_TOO_SHORT.to_string());
    }
    if length >= GOOD_LENGTH {
        credits += 1;
    }
    if length >= LONG_LENGTH {
        credits += 1;
    }

    let classes = character_classes(passphrase);
    if classes < 3 {
        feedback.push(REMARK_FEW_CLASSES.to_string());
    } else {
        credits += 1;
        if classes == 4 {
            credits += 1;
        }
    }

    if starts_with_common_pattern(passphrase) {
        credits = (credits - 2).max(0);
        feedback.push(REMARK_COMMON.to_string());
    }

    if is_single_repeated_char(passphrase) {
        credits = 0;
        feedback.push(REMARK_REPEATED.to_string());
    }

    if feedback.is_empty() {
        feedback.push(REMARK_STRONG.to_string());
    }

    StrengthAssessment {
        score: credits.clamp(0, MAX_SCORE as i32) as u8,
        feedback,
    }
}

fn character_classes(passphrase: &str) -> usize {
    let (mut lower, mut upper, mut digit, mut symbol) = (false, false, false, false);
    for c in passphrase.chars() {
        if c.is_lowercase() {
            lower = true;
        } else if c.is_uppercase() {
            upper = true;
        } else if c.is_numeric() {
            digit = true;
        } else {
            symbol = true;
        }
    }
    [lower, upper, digit, symbol].iter().filter(|&&present| present).count()
}

fn starts_with_common_pattern(passphrase: &str) -> bool {
    let lowered = passphrase.to_lowercase();
    COMMON_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix))
}

/// Two or more characters, all the same.
fn is_single_repeated_char(passphrase: &str) -> bool {
    let mut chars = passphrase.chars();
    match chars.next() {
        Some(first) => {
            let mut rest = chars.peekable();
            rest.peek().is_some() && rest.all(|c| c == first)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mentions(assessment: &StrengthAssessment, needle: &str) -> bool {
        assessment
            .feedback
            .iter()
            .any(|remark| remark.to_lowercase().contains(needle))
    }

    #[test]
    fn test_short_numeric_scores_zero() {
        let result = score("123");
        assert_eq!(result.score, 0);
        assert!(!result.feedback.is_empty());
        assert!(mentions(&result, "at least 8"));
    }

    #[test]
    fn test_repeated_character_scores_zero() {
        let result = score("aaaaaa");
        assert_eq!(result.score, 0);
        assert!(mentions(&result, "repeat"));
    }

    #[test]
    fn test_repetition_overrides_other_credits() {
        let result = score("################");
        assert_eq!(result.score, 0);
        assert!(mentions(&result, "repeat"));
    }

    #[test]
    fn test_common_pattern_penalised() {
        let result = score("password123");
        assert!(result.score < 3);
        assert!(mentions(&result, "common"));

        let upper = score("QWERTY-Lock-9999");
        assert!(mentions(&upper, "common"));
        assert_eq!(upper.score, 2);
    }

    #[test]
    fn test_strong_passphrase() {
        let result = score("MyVeryStr0ng!Passphrase2024");
        assert!(result.score >= 3);
        assert_eq!(result.score, 4);
        assert_eq!(result.feedback, vec![REMARK_STRONG.to_string()]);
    }

    #[test]
    fn test_length_credits() {
        // three classes, no length credit
        assert_eq!(score("Tr0ubadr").score, 1);
        // three classes, 12 characters
        assert_eq!(score("Tr0ubadorxyz").score, 2);
        // three classes, 16 characters
        assert_eq!(score("Tr0ubadorxyzwvut").score, 3);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 7 characters, 14 bytes: still too short.
        assert!(mentions(&score("ÄÖÜäöü1"), "at least 8"));
    }

    #[test]
    fn test_single_character_is_not_repetition() {
        assert!(!is_single_repeated_char("a"));
        assert!(!is_single_repeated_char(""));
        assert!(is_single_repeated_char("zz"));
    }

    #[test]
    fn test_empty_passphrase() {
        let result = score("");
        assert_eq!(result.score, 0);
        assert!(mentions(&result, "at least 8"));
    }
}
