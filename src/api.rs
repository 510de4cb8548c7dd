//! JSON front for the analyzer: the page's buttons as endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::controller::{AnalysisController, AnalysisReport, LatestResult};
use crate::error::{AnalysisError, CorpusError};
use crate::interpret::AnalysisKind;
use crate::reviews;

pub struct AppState {
    pub controller: Arc<AnalysisController>,
    pub latest: Arc<LatestResult>,
    /// Path or URL the corpus is (re)loaded from.
    pub reviews_source: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    #[schema(example = 500)]
    pub reviews_loaded: usize,
    pub current_review: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ReviewResponse {
    #[schema(example = "The blender broke after two uses.")]
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct ReloadResponse {
    pub reviews_loaded: usize,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct AnalyzeRequest {
    /// Overrides the server's configured token for this request.
    pub api_token: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AnalysisResponse {
    pub id: String,
    #[schema(example = "sentiment")]
    pub kind: String,
    pub review: String,
    #[schema(example = "Positive")]
    pub verdict: String,
    #[schema(example = "model")]
    pub category: String,
    #[schema(example = "Positive (98.7%)")]
    pub message: String,
    pub confidence: Option<f32>,
    pub analyzed_at: String,
}

impl From<AnalysisReport> for AnalysisResponse {
    fn from(report: AnalysisReport) -> Self {
        AnalysisResponse {
            id: report.id.to_string(),
            kind: report.kind.as_str().to_string(),
            verdict: report.verdict().to_string(),
            category: report.interpretation.category.code().to_string(),
            message: report.message(),
            confidence: report.interpretation.confidence,
            analyzed_at: report.analyzed_at.to_rfc3339(),
            review: report.review_text,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Controller errors rendered as JSON with a matching status code.
pub struct ApiError(AnalysisError);

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        ApiError(e)
    }
}

impl From<CorpusError> for ApiError {
    fn from(e: CorpusError) -> Self {
        ApiError(AnalysisError::Corpus(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AnalysisError::NoReviewSelected => StatusCode::BAD_REQUEST,
            AnalysisError::Superseded => StatusCode::CONFLICT,
            AnalysisError::Corpus(CorpusError::Empty) => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Corpus(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(status, random_review, reload_reviews, analyze_sentiment, count_nouns, latest_result),
    components(schemas(
        StatusResponse,
        ReviewResponse,
        ReloadResponse,
        AnalyzeRequest,
        AnalysisResponse,
        ErrorResponse
    )),
    tags(
        (name = "reviews", description = "Review corpus"),
        (name = "analysis", description = "Sentiment and noun-density analysis")
    )
)]
pub struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/review-analyzer-swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/status", get(status))
        .route("/reviews/random", post(random_review))
        .route("/reviews/reload", post(reload_reviews))
        .route("/analyze/sentiment", post(analyze_sentiment))
        .route("/analyze/nouns", post(count_nouns))
        .route("/results/latest", get(latest_result))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Corpus and selection state", body = StatusResponse)),
    tag = "reviews"
)]
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        reviews_loaded: state.controller.review_count(),
        current_review: state.controller.current_review().map(|r| r.text),
    })
}

#[utoipa::path(
    post,
    path = "/reviews/random",
    responses(
        (status = 200, description = "Newly selected review", body = ReviewResponse),
        (status = 503, description = "No reviews loaded", body = ErrorResponse)
    ),
    tag = "reviews"
)]
pub async fn random_review(State(state): State<Arc<AppState>>) -> Result<Json<ReviewResponse>, ApiError> {
    let review = state.controller.select_random_review()?;
    Ok(Json(ReviewResponse { text: review.text }))
}

#[utoipa::path(
    post,
    path = "/reviews/reload",
    responses(
        (status = 200, description = "Corpus reloaded", body = ReloadResponse),
        (status = 500, description = "Corpus could not be fetched or parsed", body = ErrorResponse)
    ),
    tag = "reviews"
)]
pub async fn reload_reviews(State(state): State<Arc<AppState>>) -> Result<Json<ReloadResponse>, ApiError> {
    let provider = reviews::provider_for(&state.reviews_source);
    let reviews_loaded = state.controller.reload(provider.as_ref()).await?;
    if reviews_loaded == 0 {
        warn!("⚠️ No reviews found in {}", state.reviews_source);
    }
    Ok(Json(ReloadResponse { reviews_loaded }))
}

async fn run_analysis(
    state: &AppState,
    kind: AnalysisKind,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let report = state
        .controller
        .analyze(kind, request.api_token.as_deref())
        .await?;
    Ok(Json(report.into()))
}

#[utoipa::path(
    post,
    path = "/analyze/sentiment",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Sentiment verdict", body = AnalysisResponse),
        (status = 400, description = "No review selected", body = ErrorResponse),
        (status = 409, description = "Superseded by a newer request", body = ErrorResponse)
    ),
    tag = "analysis"
)]
pub async fn analyze_sentiment(
    State(state): State<Arc<AppState>>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    run_analysis(&state, AnalysisKind::Sentiment, body).await
}

#[utoipa::path(
    post,
    path = "/analyze/nouns",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Noun-density verdict", body = AnalysisResponse),
        (status = 400, description = "No review selected", body = ErrorResponse),
        (status = 409, description = "Superseded by a newer request", body = ErrorResponse)
    ),
    tag = "analysis"
)]
pub async fn count_nouns(
    State(state): State<Arc<AppState>>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    run_analysis(&state, AnalysisKind::NounDensity, body).await
}

#[utoipa::path(
    get,
    path = "/results/latest",
    responses(
        (status = 200, description = "Last delivered result", body = AnalysisResponse),
        (status = 404, description = "Nothing analyzed for the current review")
    ),
    tag = "analysis"
)]
pub async fn latest_result(State(state): State<Arc<AppState>>) -> Result<Json<AnalysisResponse>, StatusCode> {
    state
        .latest
        .get()
        .map(|report| Json(report.into()))
        .ok_or(StatusCode::NOT_FOUND)
}
