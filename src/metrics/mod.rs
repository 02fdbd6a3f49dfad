//! Text similarity metrics
//!
//! Character and word error rates over normalized text, plus the derived
//! accuracy percentage. Every function here is pure and deterministic.

pub mod summary;

pub use summary::{render_table, summarize};

/// Normalize text for a fair comparison between engines.
///
/// Lowercases, drops everything outside `[a-z0-9]` and whitespace,
/// collapses whitespace runs to a single space and trims both ends.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character Error Rate (lower is better), clamped to `[0, 1]`
pub fn character_error_rate(prediction: &str, reference: &str) -> f64 {
    let pred = normalize(prediction);
    let reference = normalize(reference);

    if reference.is_empty() {
        return empty_reference_rate(&pred);
    }

    let distance = strsim::levenshtein(&reference, &pred);
    let len = reference.chars().count();

    (distance as f64 / len as f64).min(1.0)
}

/// Word Error Rate (lower is better), clamped to `[0, 1]`
pub fn word_error_rate(prediction: &str, reference: &str) -> f64 {
    let pred = normalize(prediction);
    let reference = normalize(reference);

    if reference.is_empty() {
        return empty_reference_rate(&pred);
    }

    let ref_words: Vec<&str> = reference.split(' ').collect();
    let pred_words: Vec<&str> = if pred.is_empty() {
        Vec::new()
    } else {
        pred.split(' ').collect()
    };

    let distance = strsim::generic_levenshtein(&ref_words, &pred_words);

    (distance as f64 / ref_words.len() as f64).min(1.0)
}

/// Accuracy as `1 - CER`, expressed as a percentage in `[0, 100]`
pub fn accuracy(prediction: &str, reference: &str) -> f64 {
    ((1.0 - character_error_rate(prediction, reference)) * 100.0).max(0.0)
}

/// An empty reference only matches an empty prediction
fn empty_reference_rate(normalized_prediction: &str) -> f64 {
    if normalized_prediction.is_empty() {
        0.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Hello World!"), "hello world");
        assert_eq!(normalize("  Total:\t$12.50\n\nTHANK  you "), "total 1250 thank you");
        assert_eq!(normalize("***"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Hello World!",
            "  multiple   spaces\tand\nnewlines ",
            "Ünïcödé façade - naïve",
            "Invoice #42: 3 x Widgets @ 9.99",
            "",
        ];

        for text in samples {
            let once = normalize(text);
            assert_eq!(normalize(&once), once, "normalize not idempotent for {:?}", text);
        }
    }

    #[test]
    fn test_cer_ignores_case_and_punctuation() {
        assert_eq!(character_error_rate("hello world", "Hello World!"), 0.0);
        assert_eq!(character_error_rate("hello", "HELLO"), 0.0);
    }

    #[test]
    fn test_cer_empty_reference() {
        assert_eq!(character_error_rate("", ""), 0.0);
        assert_eq!(character_error_rate("anything", ""), 1.0);
        // Punctuation-only prediction normalizes to empty
        assert_eq!(character_error_rate("!!!", "..."), 0.0);
    }

    #[test]
    fn test_cer_values() {
        // One substitution in five characters
        assert!((character_error_rate("hallo", "hello") - 0.2).abs() < 1e-9);
        // Empty prediction deletes every character
        assert_eq!(character_error_rate("", "hello"), 1.0);
        // Long garbage is clamped
        assert_eq!(character_error_rate("completely different output", "hi"), 1.0);
    }

    #[test]
    fn test_wer_values() {
        assert_eq!(word_error_rate("the quick brown fox", "The quick brown fox."), 0.0);
        assert!((word_error_rate("the quick brown box", "the quick brown fox") - 0.25).abs() < 1e-9);
        assert_eq!(word_error_rate("", "the quick brown fox"), 1.0);
        assert_eq!(word_error_rate("", ""), 0.0);
        assert_eq!(word_error_rate("words", ""), 1.0);
    }

    #[test]
    fn test_accuracy_matches_cer() {
        let pairs = [
            ("hello", "HELLO"),
            ("hallo", "hello"),
            ("", "hello"),
            ("anything", ""),
            ("receipt total 12", "Receipt Total: 12.00"),
        ];

        for (pred, reference) in pairs {
            let expected = ((1.0 - character_error_rate(pred, reference)) * 100.0).max(0.0);
            assert!((accuracy(pred, reference) - expected).abs() < 1e-9);
            assert!((0.0..=100.0).contains(&accuracy(pred, reference)));
        }
    }

    #[test]
    fn test_accuracy_perfect_match() {
        assert!((accuracy("hello", "HELLO") - 100.0).abs() < 1e-9);
        assert_eq!(accuracy("", "HELLO"), 0.0);
    }
}
