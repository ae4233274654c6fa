use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use safetext::api::{self, AppState};
use safetext::classifier::ZeroShotClassifier;
use safetext::config::ServiceConfig;
use safetext::verdict::VerdictEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("🚀 Starting SafeText content API...");

    let config = Arc::new(ServiceConfig::from_env());
    std::fs::create_dir_all(&config.cache_dir)?;

    tracing::info!(
        model_id = config.model_id.as_str(),
        cache_dir = %config.cache_dir.display(),
        "loading zero-shot classifier into cache"
    );
    let classifier = Arc::new(ZeroShotClassifier::load(
        &config.model_id,
        &config.cache_dir,
        config.device.as_deref(),
    )?);
    let engine = Arc::new(VerdictEngine::new(classifier));

    let app = api::router(AppState {
        engine,
        config: config.clone(),
    });

    let addr = config.bind_addr();
    println!("🌐 HTTP listening on http://{addr}");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
