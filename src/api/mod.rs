use std::sync::Arc;

use axum::routing::{post, MethodRouter};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServiceConfig;
use crate::verdict::VerdictEngine;

pub mod handlers;
pub mod types;

use handlers::{detect_file, detect_get, detect_post};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VerdictEngine>,
    pub config: Arc<ServiceConfig>,
}

/// Assemble the detection router; endpoints and the CORS layer are mounted
/// only when the config enables them.
pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut detect: MethodRouter<AppState> = MethodRouter::new();
    if config.allow_post {
        detect = detect.post(detect_post);
    }
    if config.allow_get {
        detect = detect.get(detect_get);
    }

    let mut app = Router::new().route("/detect", detect);
    if config.allow_file_upload {
        app = app.route("/detect/file", post(detect_file));
    }
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        );
    }

    app.with_state(state)
}
