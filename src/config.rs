use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Categories detected when the caller does not supply its own label set.
pub const DEFAULT_LABELS: &[&str] = &[
    "profanity",
    "hate speech",
    "graphic violence",
    "self-harm",
    "sexual content",
    "insult",
    "terrorism",
];

/// Score at or above which a label counts as flagged.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// NLI zero-shot model pulled from the hub when `STC_MODEL_ID` is unset.
pub const DEFAULT_MODEL_ID: &str = "MoritzLaurer/ModernBERT-base-zeroshot-v2.0";

pub fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

/// Process-wide configuration, built once at startup and passed down
/// explicitly. Feature flags gate which endpoints get mounted.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Enable GET /detect
    pub allow_get: bool,
    /// Enable POST /detect
    pub allow_post: bool,
    /// Enable POST /detect/file
    pub allow_file_upload: bool,
    /// Attach a permissive CORS layer
    pub enable_cors: bool,
    /// Allow the singular 'text' query param on GET /detect
    pub enable_text_param: bool,
    /// Include the 'is_safe' flag in response payloads
    pub enable_fast_detect: bool,
    pub host: String,
    pub port: u16,
    /// Where hub downloads land (env `HF_CACHE_DIR`)
    pub cache_dir: PathBuf,
    pub model_id: String,
    /// Device preference, e.g. "cpu" or "cuda:1" (env `STC_DEVICE`)
    pub device: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            allow_get: true,
            allow_post: true,
            allow_file_upload: true,
            enable_cors: true,
            enable_text_param: true,
            enable_fast_detect: true,
            host: "127.0.0.1".to_string(),
            port: 8989,
            cache_dir: env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("hf_cache"),
            model_id: DEFAULT_MODEL_ID.to_string(),
            device: None,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by environment variables where set. `dotenvy`
    /// has already been run by the binaries at this point.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("STC_API_HOST") {
            cfg.host = host;
        }
        if let Ok(raw) = env::var("STC_API_PORT") {
            match raw.parse() {
                Ok(port) => cfg.port = port,
                Err(_) => warn!("ignoring unparsable STC_API_PORT value '{raw}'"),
            }
        }
        if let Ok(dir) = env::var("HF_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(dir);
        }
        if let Ok(model_id) = env::var("STC_MODEL_ID") {
            cfg.model_id = model_id;
        }
        cfg.device = env::var("STC_DEVICE").ok().filter(|s| !s.trim().is_empty());

        cfg
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
