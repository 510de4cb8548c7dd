//! Remote inference calls with status-code mapping, timeout and model fallback.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::HttpFailure;

/// Result of one inference call (or of a whole fallback walk).
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    Success(Value),
    HttpError(HttpFailure),
    PayloadError(String),
}

/// A model URL, `<base>/models/<model-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEndpoint {
    pub model_id: String,
    pub url: String,
}

impl ModelEndpoint {
    pub fn for_model(api_base: &str, model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            url: format!("{}/models/{}", api_base.trim_end_matches('/'), model_id),
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The wire under [`InferenceClient`].
#[async_trait]
pub trait InferenceTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        auth_token: Option<&str>,
    ) -> Result<RawResponse, HttpFailure>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &Value,
        auth_token: Option<&str>,
    ) -> Result<RawResponse, HttpFailure> {
        let mut request = self.client.post(url).json(payload);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_failure)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_failure)?;
        Ok(RawResponse { status, body })
    }
}

fn transport_failure(e: reqwest::Error) -> HttpFailure {
    if e.is_timeout() {
        HttpFailure::Timeout
    } else {
        HttpFailure::Network(e.to_string())
    }
}

pub struct InferenceClient {
    transport: Arc<dyn InferenceTransport>,
    timeout: Duration,
    backoff: Duration,
}

impl InferenceClient {
    /// Client over `reqwest` with a per-request timeout.
    pub fn new(timeout: Duration) -> Self {
        Self::with_transport(Arc::new(ReqwestTransport::new()), timeout)
    }

    pub fn with_transport(transport: Arc<dyn InferenceTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before fallback attempt `n` is `backoff * n`.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// JSON body the inference API expects.
    pub fn request_body(prompt: &str) -> Value {
        serde_json::json!({ "inputs": prompt })
    }

    /// Single call. The bearer header is only sent when a token is supplied.
    pub async fn invoke(
        &self,
        endpoint: &ModelEndpoint,
        payload: &Value,
        auth_token: Option<&str>,
    ) -> InferenceOutcome {
        let call = self.transport.post_json(&endpoint.url, payload, auth_token);
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                warn!("⏱️ {} did not answer within {:?}", endpoint.model_id, self.timeout);
                InferenceOutcome::HttpError(HttpFailure::Timeout)
            }
            Ok(Err(failure)) => InferenceOutcome::HttpError(failure),
            Ok(Ok(raw)) => Self::classify(raw),
        }
    }

    fn classify(raw: RawResponse) -> InferenceOutcome {
        if let Some(failure) = HttpFailure::from_status(raw.status) {
            return InferenceOutcome::HttpError(failure);
        }
        match serde_json::from_str::<Value>(&raw.body) {
            Ok(value) => InferenceOutcome::Success(value),
            Err(e) => InferenceOutcome::PayloadError(format!("response is not JSON: {}", e)),
        }
    }

    /// Walks `endpoints` in order, moving on only when rate limited.
    /// Each endpoint is tried at most once.
    pub async fn invoke_with_fallback(
        &self,
        endpoints: &[ModelEndpoint],
        payload: &Value,
        auth_token: Option<&str>,
    ) -> InferenceOutcome {
        if endpoints.is_empty() {
            warn!("⚠️ No model endpoints configured");
            return InferenceOutcome::HttpError(HttpFailure::NotFound);
        }

        let total = endpoints.len();
        for (idx, endpoint) in endpoints.iter().enumerate() {
            let attempt = idx + 1;
            if attempt > 1 {
                info!("🔄 Fallback attempt {}/{}: {}", attempt, total, endpoint.model_id);
                if !self.backoff.is_zero() {
                    sleep(self.backoff * idx as u32).await;
                }
            }

            match self.invoke(endpoint, payload, auth_token).await {
                InferenceOutcome::HttpError(failure) if failure.is_recoverable() => {
                    warn!("⚠️ Attempt {}/{}: {} failed: {}", attempt, total, endpoint.model_id, failure);
                }
                outcome => {
                    if let InferenceOutcome::HttpError(failure) = &outcome {
                        warn!("❌ Attempt {}/{}: {} failed: {}", attempt, total, endpoint.model_id, failure);
                    }
                    return outcome;
                }
            }
        }

        warn!("❌ All {} model endpoints are rate limited", total);
        InferenceOutcome::HttpError(HttpFailure::RateLimited)
    }
}
