//! Normalizes heterogeneous inference payloads into a [`Verdict`].
//!
//! Upstream models answer in different shapes and the shapes are not
//! self-describing, so extraction tries them in a fixed order:
//!
//! 1. first element of a (possibly nested) array carrying a `label`
//!    (`[[{"label": .., "score": ..}]]` or `[{"label": ..}]`)
//! 2. a top-level object carrying a `label`
//! 3. `generated_text` from `[{..}]` or `{..}`, first line only
//!
//! The first shape that matches wins.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use crate::client::InferenceOutcome;
use crate::error::HttpFailure;
use crate::nouns::{NounDensity, NounHeuristic};

static COUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([<>])?\s*(\d+)").expect("static regex"));

const POSITIVE_KEYWORDS: &[&str] = &["positive", "pos"];
const NEGATIVE_KEYWORDS: &[&str] = &["negative", "neg"];
const NEUTRAL_KEYWORDS: &[&str] = &["neutral", "neu"];

/// What the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Sentiment,
    NounDensity,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Sentiment => "sentiment",
            AnalysisKind::NounDensity => "noun_density",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Unknown,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "Positive",
            Sentiment::Negative => "Negative",
            Sentiment::Neutral => "Neutral",
            Sentiment::Unknown => "Unknown",
        }
    }
}

/// Final classification for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Verdict {
    Sentiment(Sentiment),
    NounDensity(NounDensity),
}

impl Verdict {
    pub fn unknown(kind: AnalysisKind) -> Self {
        match kind {
            AnalysisKind::Sentiment => Verdict::Sentiment(Sentiment::Unknown),
            AnalysisKind::NounDensity => Verdict::NounDensity(NounDensity::Unknown),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            Verdict::Sentiment(Sentiment::Unknown) | Verdict::NounDensity(NounDensity::Unknown)
        )
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Sentiment(s) => f.write_str(s.as_str()),
            Verdict::NounDensity(n) => f.write_str(n.as_str()),
        }
    }
}

/// Where a verdict came from, or why there is none.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", content = "detail", rename_all = "snake_case")]
pub enum Category {
    /// The remote model's label was recognized.
    Model,
    /// The offline noun heuristic supplied the bucket.
    HeuristicFallback,
    /// The call failed before producing a payload.
    Http(HttpFailure),
    /// The payload matched no known shape.
    Payload(String),
    /// A label was extracted but matched no sentiment keyword.
    Unrecognized(String),
}

impl Category {
    pub fn code(&self) -> &'static str {
        match self {
            Category::Model => "model",
            Category::HeuristicFallback => "heuristic_fallback",
            Category::Http(failure) => failure.code(),
            Category::Payload(_) => "payload_error",
            Category::Unrecognized(_) => "unrecognized_label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub verdict: Verdict,
    pub category: Category,
    /// Model score for label/score payloads.
    pub confidence: Option<f32>,
    pub raw_label: Option<String>,
}

impl Interpretation {
    fn unknown(kind: AnalysisKind, category: Category) -> Self {
        Self {
            verdict: Verdict::unknown(kind),
            category,
            confidence: None,
            raw_label: None,
        }
    }

    /// The single user-visible message for this outcome.
    pub fn message(&self) -> String {
        match &self.category {
            Category::Model => match self.confidence {
                Some(score) => format!("{} ({:.1}%)", self.verdict, score * 100.0),
                None => self.verdict.to_string(),
            },
            Category::HeuristicFallback => {
                format!("{} (estimated locally, model answer was not usable)", self.verdict)
            }
            Category::Http(failure) => failure.to_string(),
            Category::Payload(reason) => format!("Failed to process API response: {}", reason),
            Category::Unrecognized(_) => "Could not determine sentiment from response".to_string(),
        }
    }
}

/// Known payload shapes, in extraction priority order.
#[derive(Debug, Clone, PartialEq)]
enum PayloadShape {
    NestedLabel { label: String, score: Option<f32> },
    TopLevelLabel { label: String, score: Option<f32> },
    GeneratedText(String),
}

impl PayloadShape {
    fn parse(payload: &Value) -> Result<Self, String> {
        if let Some((label, score)) = Self::nested_label(payload) {
            return Ok(PayloadShape::NestedLabel { label, score });
        }
        if let Some((label, score)) = labelled(payload) {
            return Ok(PayloadShape::TopLevelLabel { label, score });
        }
        if let Some(text) = Self::generated_text(payload) {
            return Ok(PayloadShape::GeneratedText(text));
        }
        match payload.get("error").and_then(Value::as_str) {
            Some(upstream) => Err(format!("upstream error: {}", upstream)),
            None => Err("Unexpected API response format".to_string()),
        }
    }

    fn nested_label(payload: &Value) -> Option<(String, Option<f32>)> {
        let first = payload.as_array()?.first()?;
        let candidate = match first.as_array() {
            Some(inner) => inner.first()?,
            None => first,
        };
        labelled(candidate)
    }

    fn generated_text(payload: &Value) -> Option<String> {
        let text = payload
            .as_array()
            .and_then(|items| items.first())
            .and_then(|first| first.get("generated_text"))
            .or_else(|| payload.get("generated_text"))?
            .as_str()?;
        let normalized = text.to_lowercase();
        let first_line = normalized.trim().split('\n').next().unwrap_or_default();
        Some(first_line.trim().to_string())
    }

    fn label(&self) -> &str {
        match self {
            PayloadShape::NestedLabel { label, .. }
            | PayloadShape::TopLevelLabel { label, .. }
            | PayloadShape::GeneratedText(label) => label,
        }
    }

    fn score(&self) -> Option<f32> {
        match self {
            PayloadShape::NestedLabel { score, .. } | PayloadShape::TopLevelLabel { score, .. } => {
                *score
            }
            PayloadShape::GeneratedText(_) => None,
        }
    }
}

fn labelled(value: &Value) -> Option<(String, Option<f32>)> {
    let label = value.get("label")?.as_str()?;
    let score = value.get("score").and_then(Value::as_f64).map(|s| s as f32);
    Some((label.to_string(), score))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Keyword match for sentiment labels, checked positive, negative, neutral.
pub fn classify_sentiment(label: &str) -> Option<Sentiment> {
    let label = label.to_lowercase();
    if contains_any(&label, POSITIVE_KEYWORDS) {
        Some(Sentiment::Positive)
    } else if contains_any(&label, NEGATIVE_KEYWORDS) {
        Some(Sentiment::Negative)
    } else if contains_any(&label, NEUTRAL_KEYWORDS) {
        Some(Sentiment::Neutral)
    } else {
        None
    }
}

/// Keyword match for noun-density labels, then the first count in the label.
/// `>N` and `<N` are read as strict bounds.
pub fn classify_noun_density(label: &str) -> Option<NounDensity> {
    let label = label.to_lowercase();
    if label.contains("high") {
        return Some(NounDensity::High);
    }
    if label.contains("medium") {
        return Some(NounDensity::Medium);
    }
    if label.contains("low") {
        return Some(NounDensity::Low);
    }

    let caps = COUNT_PATTERN.captures(&label)?;
    let count: usize = caps.get(2)?.as_str().parse().ok()?;
    let count = match caps.get(1).map(|m| m.as_str()) {
        Some(">") => count.saturating_add(1),
        Some("<") => count.saturating_sub(1),
        _ => count,
    };
    Some(NounHeuristic::bucket(count))
}

/// Turns an [`InferenceOutcome`] into an [`Interpretation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseInterpreter {
    heuristic: NounHeuristic,
}

impl ResponseInterpreter {
    pub fn new(heuristic: NounHeuristic) -> Self {
        Self { heuristic }
    }

    pub fn interpret(
        &self,
        outcome: InferenceOutcome,
        kind: AnalysisKind,
        original_text: &str,
    ) -> Interpretation {
        let shape = match outcome {
            InferenceOutcome::HttpError(failure) => {
                return Interpretation::unknown(kind, Category::Http(failure));
            }
            InferenceOutcome::PayloadError(reason) => Err(reason),
            InferenceOutcome::Success(payload) => PayloadShape::parse(&payload),
        };

        let shape = match shape {
            Ok(shape) => shape,
            Err(reason) => {
                warn!("⚠️ Unusable {} payload: {}", kind.as_str(), reason);
                return self.fallback(kind, original_text, Category::Payload(reason), None);
            }
        };

        let label = shape.label();
        debug!("Extracted {} label {:?} from {:?}", kind.as_str(), label, shape);

        let verdict = match kind {
            AnalysisKind::Sentiment => classify_sentiment(label).map(Verdict::Sentiment),
            AnalysisKind::NounDensity => classify_noun_density(label).map(Verdict::NounDensity),
        };

        match verdict {
            Some(verdict) => Interpretation {
                verdict,
                category: Category::Model,
                confidence: shape.score(),
                raw_label: Some(label.to_string()),
            },
            None => self.fallback(
                kind,
                original_text,
                Category::Unrecognized(label.to_string()),
                Some(label.to_string()),
            ),
        }
    }

    /// Noun density falls back to the offline estimate; sentiment stays `Unknown`.
    fn fallback(
        &self,
        kind: AnalysisKind,
        original_text: &str,
        category: Category,
        raw_label: Option<String>,
    ) -> Interpretation {
        match kind {
            AnalysisKind::Sentiment => Interpretation {
                raw_label,
                ..Interpretation::unknown(kind, category)
            },
            AnalysisKind::NounDensity => {
                let count = self.heuristic.estimate(original_text);
                debug!("Heuristic fallback counted {} noun-like words", count);
                Interpretation {
                    verdict: Verdict::NounDensity(NounHeuristic::bucket(count)),
                    category: Category::HeuristicFallback,
                    confidence: None,
                    raw_label,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TWENTY_NOUNS: &str = "camera battery screen phone price delivery quality design \
        color size sound picture service store package manual charger button display speaker";

    fn interpret(payload: Value, kind: AnalysisKind, text: &str) -> Interpretation {
        ResponseInterpreter::default().interpret(InferenceOutcome::Success(payload), kind, text)
    }

    #[test]
    fn test_top_level_label() {
        let result = interpret(json!({"label": "POSITIVE"}), AnalysisKind::Sentiment, "");
        assert_eq!(result.verdict, Verdict::Sentiment(Sentiment::Positive));
        assert_eq!(result.category, Category::Model);
    }

    #[test]
    fn test_nested_label_with_score() {
        let payload = json!([[{"label": "negative", "score": 0.9}, {"label": "positive", "score": 0.1}]]);
        let result = interpret(payload, AnalysisKind::Sentiment, "");
        assert_eq!(result.verdict, Verdict::Sentiment(Sentiment::Negative));
        assert_eq!(result.confidence, Some(0.9));
        assert_eq!(result.message(), "Negative (90.0%)");
    }

    #[test]
    fn test_flat_array_label() {
        let result = interpret(json!([{"label": "NEU"}]), AnalysisKind::Sentiment, "");
        assert_eq!(result.verdict, Verdict::Sentiment(Sentiment::Neutral));
    }

    #[test]
    fn test_nested_array_wins_over_generated_text() {
        let payload = json!([[{"label": "positive", "generated_text": "negative"}]]);
        let result = interpret(payload, AnalysisKind::Sentiment, "");
        assert_eq!(result.verdict, Verdict::Sentiment(Sentiment::Positive));
    }

    #[test]
    fn test_generated_text_first_line() {
        let payload = json!([{"generated_text": "  Negative\nbecause the review mentions positive things"}]);
        let result = interpret(payload, AnalysisKind::Sentiment, "");
        assert_eq!(result.verdict, Verdict::Sentiment(Sentiment::Negative));
        assert_eq!(result.raw_label.as_deref(), Some("negative"));
    }

    #[test]
    fn test_generated_text_object() {
        let payload = json!({"generated_text": "Medium"});
        let result = interpret(payload, AnalysisKind::NounDensity, "");
        assert_eq!(result.verdict, Verdict::NounDensity(NounDensity::Medium));
    }

    #[test]
    fn test_unmatched_sentiment_is_unknown() {
        let result = interpret(json!({"label": "LABEL_2"}), AnalysisKind::Sentiment, TWENTY_NOUNS);
        assert_eq!(result.verdict, Verdict::Sentiment(Sentiment::Unknown));
        assert_eq!(result.category, Category::Unrecognized("LABEL_2".to_string()));
        assert_eq!(result.message(), "Could not determine sentiment from response");
    }

    #[test]
    fn test_noun_density_falls_back_to_heuristic() {
        let payload = json!([{"generated_text": "I am not sure what you mean."}]);
        let result = interpret(payload, AnalysisKind::NounDensity, TWENTY_NOUNS);
        assert_eq!(result.verdict, Verdict::NounDensity(NounDensity::High));
        assert_eq!(result.category, Category::HeuristicFallback);
    }

    #[test]
    fn test_unknown_shape_falls_back_for_nouns_only() {
        let payload = json!({"unexpected": true});
        let nouns = interpret(payload.clone(), AnalysisKind::NounDensity, TWENTY_NOUNS);
        assert_eq!(nouns.verdict, Verdict::NounDensity(NounDensity::High));

        let sentiment = interpret(payload, AnalysisKind::Sentiment, TWENTY_NOUNS);
        assert_eq!(sentiment.verdict, Verdict::Sentiment(Sentiment::Unknown));
        assert!(matches!(sentiment.category, Category::Payload(_)));
    }

    #[test]
    fn test_upstream_error_body() {
        let result = interpret(json!({"error": "Model too busy"}), AnalysisKind::Sentiment, "");
        assert_eq!(
            result.category,
            Category::Payload("upstream error: Model too busy".to_string())
        );
    }

    #[test]
    fn test_http_error_never_succeeds() {
        let interpreter = ResponseInterpreter::default();
        let result = interpreter.interpret(
            InferenceOutcome::HttpError(HttpFailure::ModelLoading),
            AnalysisKind::NounDensity,
            TWENTY_NOUNS,
        );
        assert_eq!(result.verdict, Verdict::NounDensity(NounDensity::Unknown));
        assert_eq!(result.category, Category::Http(HttpFailure::ModelLoading));
        assert!(result.verdict.is_unknown());
    }

    #[test]
    fn test_noun_density_numeric_labels() {
        assert_eq!(classify_noun_density(">15"), Some(NounDensity::High));
        assert_eq!(classify_noun_density("<6"), Some(NounDensity::Low));
        assert_eq!(classify_noun_density("6-15"), Some(NounDensity::Medium));
        assert_eq!(classify_noun_density("about 16 nouns"), Some(NounDensity::High));
        assert_eq!(classify_noun_density("5"), Some(NounDensity::Low));
        assert_eq!(classify_noun_density("no idea"), None);
    }

    #[test]
    fn test_sentiment_keyword_order() {
        assert_eq!(classify_sentiment("POSITIVE"), Some(Sentiment::Positive));
        assert_eq!(classify_sentiment("Neg"), Some(Sentiment::Negative));
        assert_eq!(classify_sentiment("neutral"), Some(Sentiment::Neutral));
        assert_eq!(classify_sentiment("LABEL_0"), None);
    }
}
