//! The atomic scored record produced for every sample

use serde::{Deserialize, Serialize};

use crate::metrics;

/// Maximum number of characters kept for prediction and reference text
pub const MAX_TEXT_CHARS: usize = 200;

/// One engine's score on one image of one category.
///
/// Column names match the persisted CSV consumed by reporting tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Engine display name
    #[serde(rename = "model")]
    pub engine: String,
    /// Category key
    pub category: String,
    /// Image file name
    pub image: String,
    /// Character error rate (0.0 - 1.0)
    pub cer: f64,
    /// Word error rate (0.0 - 1.0)
    pub wer: f64,
    /// Accuracy percentage (0.0 - 100.0)
    pub accuracy: f64,
    /// Wall-clock extraction time in seconds
    #[serde(rename = "time_sec")]
    pub elapsed_secs: f64,
    /// Truncated engine output
    pub prediction: String,
    /// Truncated reference text
    pub ground_truth: String,
}

/// Identity of a row in the result store: (engine, category, image)
pub type RowKey = (String, String, String);

impl ResultRow {
    /// Score a prediction against its reference and build the row
    pub fn score(
        engine: &str,
        category: &str,
        image: &str,
        prediction: &str,
        reference: &str,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            engine: engine.to_string(),
            category: category.to_string(),
            image: image.to_string(),
            cer: round_to(metrics::character_error_rate(prediction, reference), 4),
            wer: round_to(metrics::word_error_rate(prediction, reference), 4),
            accuracy: round_to(metrics::accuracy(prediction, reference), 2),
            elapsed_secs: round_to(elapsed_secs, 3),
            prediction: truncate_chars(prediction, MAX_TEXT_CHARS),
            ground_truth: truncate_chars(reference, MAX_TEXT_CHARS),
        }
    }

    /// Identity key used for deduplication
    pub fn key(&self) -> RowKey {
        (
            self.engine.clone(),
            self.category.clone(),
            self.image.clone(),
        )
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
