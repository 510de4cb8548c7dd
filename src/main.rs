use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};

use review_analyzer::api::{self, AppState};
use review_analyzer::config::AppConfig;
use review_analyzer::controller::{AnalysisController, FanOut, LatestResult, ResultSink, TracingSink};
use review_analyzer::reviews::{self, ReviewStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env();
    if config.api_token.is_none() {
        warn!("🔑 HF_API_TOKEN not set. Anonymous requests are heavily rate limited.");
    }

    // The page stays usable without a corpus; sampling reports the problem instead.
    let provider = reviews::provider_for(&config.reviews_source);
    let store = match reviews::load_from(provider.as_ref()).await {
        Ok(store) => store,
        Err(e) => {
            error!("❌ {}", e);
            ReviewStore::default()
        }
    };
    if store.is_empty() {
        warn!("⚠️ No reviews found in {}", config.reviews_source);
    }

    let latest = Arc::new(LatestResult::default());
    let sinks: Vec<Arc<dyn ResultSink>> = vec![Arc::new(TracingSink), latest.clone()];
    let controller = AnalysisController::from_config(&config, store, Arc::new(FanOut(sinks)));

    let state = Arc::new(AppState {
        controller: Arc::new(controller),
        latest,
        reviews_source: config.reviews_source.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("🚀 Listening on {}", listener.local_addr()?);
    axum::serve(listener, api::router(state)).await?;

    Ok(())
}
