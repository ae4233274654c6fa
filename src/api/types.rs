use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::verdict::Verdict;

/// Body of POST /detect.
#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

/// Query string of GET /detect; `texts` and `labels` accept repeated keys.
#[derive(Debug, Deserialize)]
pub struct DetectQuery {
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub threshold: Option<f32>,
}

/// Wire shape of one verdict. `is_safe` is dropped from the payload when
/// fast-detect is disabled.
#[derive(Debug, Serialize)]
pub struct DetectResult {
    pub text: String,
    pub scores: IndexMap<String, f32>,
    pub flagged_labels: IndexMap<String, f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_safe: Option<bool>,
}

impl DetectResult {
    pub fn from_verdict(verdict: Verdict, include_is_safe: bool) -> Self {
        Self {
            text: verdict.text,
            scores: verdict.scores,
            flagged_labels: verdict.flagged_labels,
            is_safe: include_is_safe.then_some(verdict.is_safe),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub results: Vec<DetectResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verdict() -> Verdict {
        let mut scores = IndexMap::new();
        scores.insert("profanity".to_string(), 0.75);
        scores.insert("insult".to_string(), 0.25);
        let mut flagged = IndexMap::new();
        flagged.insert("profanity".to_string(), 0.75);
        Verdict {
            text: "some text".to_string(),
            scores,
            flagged_labels: flagged,
            is_safe: false,
        }
    }

    #[test]
    fn result_serializes_per_contract() {
        let result = DetectResult::from_verdict(verdict(), true);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "text": "some text",
                "scores": { "profanity": 0.75, "insult": 0.25 },
                "flagged_labels": { "profanity": 0.75 },
                "is_safe": false,
            })
        );
    }

    #[test]
    fn is_safe_omitted_when_fast_detect_disabled() {
        let result = DetectResult::from_verdict(verdict(), false);
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("is_safe").is_none());
    }

    #[test]
    fn response_wraps_results_array() {
        let response = DetectResponse {
            results: vec![DetectResult::from_verdict(verdict(), true)],
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["results"].is_array());
        assert_eq!(value["results"][0]["text"], "some text");
    }
}
