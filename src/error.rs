//! Error taxonomy shared by the corpus, the inference client and the controller.

use serde::Serialize;
use thiserror::Error;

/// Failures while loading or sampling the review corpus.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorpusError {
    #[error("Failed to parse TSV file: {0}")]
    Parse(String),

    #[error("No reviews available. Please wait for reviews to load.")]
    Empty,

    #[error("Failed to load reviews file: {0}")]
    Fetch(String),
}

/// Non-success outcome of a single inference call.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HttpFailure {
    #[error("Invalid API token. Please check your Hugging Face API token.")]
    Unauthorized,

    #[error("Rate limit exceeded. Please wait or add your API token for higher limits.")]
    RateLimited,

    #[error("Model not found. Please check the configured model id.")]
    NotFound,

    #[error("Model is loading. Please try again in a few seconds.")]
    ModelLoading,

    #[error("API error: {0}")]
    Generic(u16),

    #[error("Request timed out before the model answered.")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),
}

impl HttpFailure {
    /// Maps a non-2xx status code onto the taxonomy. Returns `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            401 => Some(HttpFailure::Unauthorized),
            402 | 429 => Some(HttpFailure::RateLimited),
            404 => Some(HttpFailure::NotFound),
            503 => Some(HttpFailure::ModelLoading),
            other => Some(HttpFailure::Generic(other)),
        }
    }

    /// Only rate limiting is worth another endpoint.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, HttpFailure::RateLimited)
    }

    pub fn code(&self) -> &'static str {
        match self {
            HttpFailure::Unauthorized => "unauthorized",
            HttpFailure::RateLimited => "rate_limited",
            HttpFailure::NotFound => "not_found",
            HttpFailure::ModelLoading => "model_loading",
            HttpFailure::Generic(_) => "http_error",
            HttpFailure::Timeout => "timeout",
            HttpFailure::Network(_) => "network_error",
        }
    }
}

/// Errors surfaced by the analysis controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("Please select a review first using \"Select Random Review\"")]
    NoReviewSelected,

    #[error("Analysis was superseded by a newer request")]
    Superseded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_taxonomy() {
        assert_eq!(HttpFailure::from_status(200), None);
        assert_eq!(HttpFailure::from_status(204), None);
        assert_eq!(HttpFailure::from_status(401), Some(HttpFailure::Unauthorized));
        assert_eq!(HttpFailure::from_status(402), Some(HttpFailure::RateLimited));
        assert_eq!(HttpFailure::from_status(429), Some(HttpFailure::RateLimited));
        assert_eq!(HttpFailure::from_status(404), Some(HttpFailure::NotFound));
        assert_eq!(HttpFailure::from_status(503), Some(HttpFailure::ModelLoading));
        assert_eq!(HttpFailure::from_status(500), Some(HttpFailure::Generic(500)));
    }

    #[test]
    fn test_only_rate_limit_is_recoverable() {
        assert!(HttpFailure::RateLimited.is_recoverable());
        assert!(!HttpFailure::ModelLoading.is_recoverable());
        assert!(!HttpFailure::Timeout.is_recoverable());
        assert!(!HttpFailure::Generic(500).is_recoverable());
    }

    #[test]
    fn test_messages_are_user_facing() {
        assert_eq!(HttpFailure::Generic(418).to_string(), "API error: 418");
        assert!(HttpFailure::ModelLoading.to_string().contains("loading"));
    }
}
