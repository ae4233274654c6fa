pub mod zero_shot;

pub use zero_shot::ZeroShotClassifier;

use anyhow::Result;

/// The inference boundary: one text and a candidate label set in,
/// independent per-label probabilities (each in [0, 1]) out. Scores are
/// multi-label and need not sum to 1.
pub trait Classifier: Send + Sync {
    fn classify(&self, text: &str, labels: &[String]) -> Result<Vec<(String, f32)>>;
}
