use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::classifier::Classifier;
use crate::config;

#[derive(Debug, Error)]
pub enum DetectError {
    /// Caller-supplied input is unusable; never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The underlying inference call failed.
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(anyhow::Error),
}

/// One text scored against a label set. Both maps keep descending score
/// order and serialize as JSON objects.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub text: String,
    pub scores: IndexMap<String, f32>,
    pub flagged_labels: IndexMap<String, f32>,
    pub is_safe: bool,
}

/// Turns classifier scores into flagged/safe verdicts. Stateless apart
/// from the injected classifier; safe to share behind an `Arc`.
pub struct VerdictEngine {
    classifier: Arc<dyn Classifier>,
    default_labels: Vec<String>,
}

impl VerdictEngine {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            classifier,
            default_labels: config::default_labels(),
        }
    }

    /// Score one text. `labels: None` substitutes the default label set.
    /// Validation happens before the classifier is touched.
    pub fn evaluate(
        &self,
        text: &str,
        labels: Option<&[String]>,
        threshold: f32,
    ) -> Result<Verdict, DetectError> {
        if text.trim().is_empty() {
            return Err(DetectError::InvalidInput(
                "text must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DetectError::InvalidInput(format!(
                "threshold {threshold} outside [0, 1]"
            )));
        }
        let labels = match labels {
            Some(labels) => {
                validate_labels(labels)?;
                labels
            }
            None => self.default_labels.as_slice(),
        };

        let mut scored = self
            .classifier
            .classify(text, labels)
            .map_err(DetectError::ClassifierUnavailable)?;
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut scores = IndexMap::with_capacity(scored.len());
        let mut flagged_labels = IndexMap::new();
        for (label, score) in scored {
            if score >= threshold {
                flagged_labels.insert(label.clone(), score);
            }
            scores.insert(label, score);
        }
        let is_safe = flagged_labels.is_empty();
        debug!(flagged = flagged_labels.len(), is_safe, "verdict computed");

        Ok(Verdict {
            text: text.to_string(),
            scores,
            flagged_labels,
            is_safe,
        })
    }

    /// Score each text independently, preserving input order. Aborts on
    /// the first failure; no partial results are returned.
    pub fn evaluate_many(
        &self,
        texts: &[String],
        labels: Option<&[String]>,
        threshold: f32,
    ) -> Result<Vec<Verdict>, DetectError> {
        texts
            .iter()
            .map(|text| self.evaluate(text, labels, threshold))
            .collect()
    }
}

fn validate_labels(labels: &[String]) -> Result<(), DetectError> {
    if labels.is_empty() {
        return Err(DetectError::InvalidInput(
            "label set must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if label.trim().is_empty() {
            return Err(DetectError::InvalidInput(
                "labels must not be blank".to_string(),
            ));
        }
        if !seen.insert(label.as_str()) {
            return Err(DetectError::InvalidInput(format!(
                "duplicate label '{label}'"
            )));
        }
    }
    Ok(())
}
