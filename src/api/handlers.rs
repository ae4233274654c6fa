use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::Query;
use serde_json::json;
use tracing::{error, info};

use crate::config;
use crate::verdict::DetectError;

use super::types::{DetectQuery, DetectRequest, DetectResponse, DetectResult};
use super::AppState;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        match err {
            DetectError::InvalidInput(reason) => Self::unprocessable(reason),
            DetectError::ClassifierUnavailable(source) => {
                error!(error = %source, "classification failed");
                // detail stays in the log, not on the wire
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal classification error",
                )
            }
        }
    }
}

/// POST /detect — JSON body with texts, optional labels and threshold.
pub async fn detect_post(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    if req.texts.is_empty() {
        return Err(ApiError::unprocessable(
            "'texts' must contain at least one entry",
        ));
    }
    info!(texts = req.texts.len(), "POST /detect");

    let threshold = req.threshold.unwrap_or(config::DEFAULT_THRESHOLD);
    let response = run_detection(&state, req.texts, req.labels, threshold).await?;
    Ok(Json(response))
}

/// GET /detect?texts=one&texts=two or /detect?text=single
pub async fn detect_get(
    State(state): State<AppState>,
    Query(query): Query<DetectQuery>,
) -> Result<Json<DetectResponse>, ApiError> {
    let texts = if let Some(text) = query.text {
        if !state.config.enable_text_param {
            return Err(ApiError::bad_request(
                "Single-text query param 'text' not supported",
            ));
        }
        vec![text]
    } else if !query.texts.is_empty() {
        query.texts
    } else {
        return Err(ApiError::unprocessable(
            "Provide either 'texts' or 'text' query parameter",
        ));
    };
    info!(texts = texts.len(), "GET /detect");

    let labels = (!query.labels.is_empty()).then_some(query.labels);
    let threshold = query.threshold.unwrap_or(config::DEFAULT_THRESHOLD);
    let response = run_detection(&state, texts, labels, threshold).await?;
    Ok(Json(response))
}

/// POST /detect/file — multipart upload of a text/plain file; each
/// non-blank line is scored separately.
pub async fn detect_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DetectResponse>, ApiError> {
    let mut content: Option<String> = None;
    let mut labels: Vec<String> = Vec::new();
    let mut threshold = config::DEFAULT_THRESHOLD;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                if content.is_some() {
                    return Err(ApiError::bad_request(
                        "Only one file per request is supported",
                    ));
                }
                if field.content_type() != Some("text/plain") {
                    return Err(ApiError::bad_request("Only text/plain supported."));
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file field: {e}")))?;
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|_| ApiError::bad_request("File must be valid UTF-8"))?;
                content = Some(text);
            }
            Some("labels") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read field: {e}")))?;
                labels.extend(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                );
            }
            Some("threshold") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read field: {e}")))?;
                threshold = raw.trim().parse().map_err(|_| {
                    ApiError::bad_request(format!("Invalid threshold '{}'", raw.trim()))
                })?;
            }
            _ => {}
        }
    }

    let content = content
        .ok_or_else(|| ApiError::bad_request("No file found in multipart upload"))?;
    let texts = file_texts(&content);
    if texts.is_empty() {
        return Err(ApiError::unprocessable("uploaded file contains no text"));
    }
    info!(lines = texts.len(), "POST /detect/file");

    let labels = (!labels.is_empty()).then_some(labels);
    let response = run_detection(&state, texts, labels, threshold).await?;
    Ok(Json(response))
}

/// Shared tail of every endpoint: hand the batch to the engine on a
/// blocking thread so model latency never stalls the async workers.
async fn run_detection(
    state: &AppState,
    texts: Vec<String>,
    labels: Option<Vec<String>>,
    threshold: f32,
) -> Result<DetectResponse, ApiError> {
    let engine = state.engine.clone();
    let include_is_safe = state.config.enable_fast_detect;

    let verdicts = tokio::task::spawn_blocking(move || {
        engine.evaluate_many(&texts, labels.as_deref(), threshold)
    })
    .await
    .map_err(|e| {
        error!("inference task failed: {e}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })??;

    Ok(DetectResponse {
        results: verdicts
            .into_iter()
            .map(|verdict| DetectResult::from_verdict(verdict, include_is_safe))
            .collect(),
    })
}

/// One text per non-blank line; lone CRs and trailing newlines are noise,
/// not inputs.
fn file_texts(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classifier;
    use crate::config::ServiceConfig;
    use crate::verdict::VerdictEngine;
    use std::sync::Arc;

    struct FixedScores(Vec<(&'static str, f32)>);

    impl Classifier for FixedScores {
        fn classify(&self, _text: &str, labels: &[String]) -> anyhow::Result<Vec<(String, f32)>> {
            Ok(labels
                .iter()
                .map(|label| {
                    let score = self
                        .0
                        .iter()
                        .find(|(name, _)| name == label)
                        .map(|(_, score)| *score)
                        .unwrap_or(0.0);
                    (label.clone(), score)
                })
                .collect())
        }
    }

    fn state_with(scores: Vec<(&'static str, f32)>, config: ServiceConfig) -> AppState {
        AppState {
            engine: Arc::new(VerdictEngine::new(Arc::new(FixedScores(scores)))),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn post_detect_scores_each_text() {
        let state = state_with(vec![("profanity", 0.75)], ServiceConfig::default());
        let req = DetectRequest {
            texts: vec!["one".to_string(), "two".to_string()],
            labels: Some(vec!["profanity".to_string(), "insult".to_string()]),
            threshold: Some(0.5),
        };

        let Json(response) = detect_post(State(state), Json(req)).await.unwrap();

        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].text, "one");
        assert_eq!(response.results[0].flagged_labels["profanity"], 0.75);
        assert_eq!(response.results[0].is_safe, Some(false));
    }

    #[tokio::test]
    async fn post_detect_rejects_empty_text_list() {
        let state = state_with(vec![], ServiceConfig::default());
        let req = DetectRequest {
            texts: Vec::new(),
            labels: None,
            threshold: None,
        };

        let err = detect_post(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn post_detect_maps_invalid_threshold_to_422() {
        let state = state_with(vec![], ServiceConfig::default());
        let req = DetectRequest {
            texts: vec!["fine".to_string()],
            labels: None,
            threshold: Some(1.5),
        };

        let err = detect_post(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn get_detect_requires_some_text() {
        let state = state_with(vec![], ServiceConfig::default());
        let query = DetectQuery {
            texts: Vec::new(),
            text: None,
            labels: Vec::new(),
            threshold: None,
        };

        let err = detect_get(State(state), Query(query)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn get_detect_singular_text_param_can_be_disabled() {
        let config = ServiceConfig {
            enable_text_param: false,
            ..ServiceConfig::default()
        };
        let state = state_with(vec![], config);
        let query = DetectQuery {
            texts: Vec::new(),
            text: Some("hello".to_string()),
            labels: Vec::new(),
            threshold: None,
        };

        let err = detect_get(State(state), Query(query)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn fast_detect_off_drops_is_safe() {
        let config = ServiceConfig {
            enable_fast_detect: false,
            ..ServiceConfig::default()
        };
        let state = state_with(vec![("insult", 0.25)], config);
        let query = DetectQuery {
            texts: vec!["hello".to_string()],
            text: None,
            labels: vec!["insult".to_string()],
            threshold: None,
        };

        let Json(response) = detect_get(State(state), Query(query)).await.unwrap();
        assert_eq!(response.results[0].is_safe, None);
    }

    #[test]
    fn file_texts_drops_blank_lines_and_crs() {
        let content = "first line\r\n\r\n  \nsecond line\n";
        assert_eq!(file_texts(content), ["first line", "second line"]);
    }

    #[test]
    fn file_texts_treats_unterminated_content_as_one_text() {
        assert_eq!(file_texts("just one line"), ["just one line"]);
    }
}
