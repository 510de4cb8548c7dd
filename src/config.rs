//! Environment-driven settings. Call `dotenv().ok()` before [`AppConfig::from_env`].

use std::time::Duration;

use crate::client::ModelEndpoint;
use crate::interpret::AnalysisKind;

pub const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";
pub const DEFAULT_SENTIMENT_MODELS: &str =
    "siebert/sentiment-roberta-large-english,distilbert-base-uncased-finetuned-sst-2-english";
pub const DEFAULT_NOUN_MODELS: &str = "microsoft/DialoGPT-large,microsoft/DialoGPT-medium";
pub const DEFAULT_SENTIMENT_PROMPT: &str = "{review}";
pub const DEFAULT_NOUN_PROMPT: &str =
    "Count the nouns in this review and return only High (>15), Medium (6-15), or Low (<6). {review}";

/// Template placeholder replaced with the review text.
pub const REVIEW_PLACEHOLDER: &str = "{review}";

/// Prompt with a `{review}` placeholder. A template without the placeholder
/// gets the review appended after a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate(String);

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, review: &str) -> String {
        if self.0.contains(REVIEW_PLACEHOLDER) {
            self.0.replace(REVIEW_PLACEHOLDER, review)
        } else {
            format!("{} {}", self.0.trim_end(), review)
        }
    }
}

/// Everything that differs between analysis kinds.
#[derive(Debug, Clone)]
pub struct AnalysisProfile {
    pub kind: AnalysisKind,
    /// Tried in order; later entries are rate-limit fallbacks.
    pub endpoints: Vec<ModelEndpoint>,
    pub prompt: PromptTemplate,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base: String,
    pub api_token: Option<String>,
    pub sentiment_models: Vec<String>,
    pub noun_models: Vec<String>,
    pub sentiment_prompt: String,
    pub noun_prompt: String,
    pub reviews_source: String,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
    pub heuristic_strict: bool,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        // A zero timeout would fail every call, so it counts as invalid
        let request_timeout_secs: u64 = get("REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.trim().parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(30);
        let retry_backoff_ms: u64 = get("RETRY_BACKOFF_MS")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(500);
        let heuristic_strict = match get("NOUN_HEURISTIC_STRICT") {
            Some(v) => !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"),
            None => true,
        };

        Self {
            api_base: get_or("INFERENCE_API_BASE", DEFAULT_API_BASE),
            api_token: get("HF_API_TOKEN").map(|t| t.trim().to_string()),
            sentiment_models: parse_list(&get_or("SENTIMENT_MODELS", DEFAULT_SENTIMENT_MODELS)),
            noun_models: parse_list(&get_or("NOUN_MODELS", DEFAULT_NOUN_MODELS)),
            sentiment_prompt: get_or("SENTIMENT_PROMPT", DEFAULT_SENTIMENT_PROMPT),
            noun_prompt: get_or("NOUN_PROMPT", DEFAULT_NOUN_PROMPT),
            reviews_source: get_or("REVIEWS_SOURCE", "reviews_test.tsv"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            heuristic_strict,
            bind_addr: get_or("BIND_ADDR", "0.0.0.0:3000"),
        }
    }

    pub fn profile(&self, kind: AnalysisKind) -> AnalysisProfile {
        let (models, prompt) = match kind {
            AnalysisKind::Sentiment => (&self.sentiment_models, &self.sentiment_prompt),
            AnalysisKind::NounDensity => (&self.noun_models, &self.noun_prompt),
        };
        AnalysisProfile {
            kind,
            endpoints: models
                .iter()
                .map(|model| ModelEndpoint::for_model(&self.api_base, model))
                .collect(),
            prompt: PromptTemplate::new(prompt.clone()),
        }
    }
}

/// Comma-separated list, blanks dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
