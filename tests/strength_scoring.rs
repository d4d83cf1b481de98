//! Scoring scenarios for the passphrase strength scorer.

use envelock::score_passphrase;

fn mentions(feedback: &[String], needle: &str) -> bool {
    feedback
        .iter()
        .any(|remark| remark.to_lowercase().contains(needle))
}

#[test]
fn test_trivial_digits() {
    let result = score_passphrase("123");
    assert_eq!(result.score, 0);
    assert!(!result.feedback.is_empty());
}

#[test]
fn test_repeated_character() {
    let result = score_passphrase("aaaaaa");
    assert_eq!(result.score, 0);
    assert!(mentions(&result.feedback, "repeat"));
}

#[test]
fn test_common_prefix() {
    let result = score_passphrase("password123");
    assert!(result.score < 3);
    assert!(mentions(&result.feedback, "common"));
}

#[test]
fn test_strong_passphrase() {
    let result = score_passphrase("MyVeryStr0ng!Passphrase2024");
    assert!(result.score >= 3);
    assert_eq!(result.feedback.len(), 1);
}

#[test]
fn test_score_never_exceeds_four() {
    for candidate in [
        "Correct-Horse-Battery-Staple-42",
        "ÜberLongPassphrase_With_Everything_9",
        "a",
        "",
        "abcABC123!@#",
    ] {
        assert!(score_passphrase(candidate).score <= 4, "{candidate}");
    }
}

#[test]
fn test_serialises_for_ui() {
    let json = serde_json::to_value(score_passphrase("123")).unwrap();
    assert_eq!(json["score"], 0);
    assert!(json["feedback"].is_array());
}
