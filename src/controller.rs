//! Orchestrates corpus → inference → interpretation → sink.
//!
//! Analyses run one at a time behind an async lock. Every trigger (a new
//! selection or a new analysis) advances a generation counter, and a result
//! is only written to the sink if its generation is still the latest, so a
//! slow earlier request can never overwrite a newer one.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::InferenceClient;
use crate::config::{AnalysisProfile, AppConfig};
use crate::error::{AnalysisError, CorpusError};
use crate::interpret::{AnalysisKind, Interpretation, ResponseInterpreter, Verdict};
use crate::nouns::NounHeuristic;
use crate::reviews::{self, Review, ReviewProvider, ReviewStore};

/// Outcome of one completed analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub kind: AnalysisKind,
    pub review_text: String,
    pub interpretation: Interpretation,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn verdict(&self) -> Verdict {
        self.interpretation.verdict
    }

    pub fn message(&self) -> String {
        self.interpretation.message()
    }
}

/// Receives every report that is still current when it completes.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, report: &AnalysisReport);

    /// Called when the review changes and earlier reports no longer apply.
    fn clear(&self) {}
}

/// Logs each report.
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn deliver(&self, report: &AnalysisReport) {
        info!(
            "✅ [{}] {} -> {} ({})",
            report.id,
            report.kind.as_str(),
            report.message(),
            report.interpretation.category.code()
        );
    }
}

/// Keeps the most recent report for later reads.
#[derive(Default)]
pub struct LatestResult {
    latest: Mutex<Option<AnalysisReport>>,
}

impl LatestResult {
    pub fn get(&self) -> Option<AnalysisReport> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for LatestResult {
    fn deliver(&self, report: &AnalysisReport) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
    }

    fn clear(&self) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Forwards each report to every inner sink in order.
pub struct FanOut(pub Vec<Arc<dyn ResultSink>>);

impl ResultSink for FanOut {
    fn deliver(&self, report: &AnalysisReport) {
        for sink in &self.0 {
            sink.deliver(report);
        }
    }

    fn clear(&self) {
        for sink in &self.0 {
            sink.clear();
        }
    }
}

#[derive(Default)]
struct Selection {
    generation: u64,
    current: Option<Review>,
}

pub struct AnalysisController {
    store: RwLock<ReviewStore>,
    selection: Mutex<Selection>,
    in_flight: tokio::sync::Mutex<()>,
    client: InferenceClient,
    interpreter: ResponseInterpreter,
    sentiment: AnalysisProfile,
    nouns: AnalysisProfile,
    default_token: Option<String>,
    sink: Arc<dyn ResultSink>,
}

impl AnalysisController {
    pub fn new(
        store: ReviewStore,
        client: InferenceClient,
        sentiment: AnalysisProfile,
        nouns: AnalysisProfile,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            store: RwLock::new(store),
            selection: Mutex::default(),
            in_flight: tokio::sync::Mutex::new(()),
            client,
            interpreter: ResponseInterpreter::default(),
            sentiment,
            nouns,
            default_token: None,
            sink,
        }
    }

    /// Wires a controller from settings, using the `reqwest` transport.
    pub fn from_config(config: &AppConfig, store: ReviewStore, sink: Arc<dyn ResultSink>) -> Self {
        let client = InferenceClient::new(config.request_timeout).with_backoff(config.retry_backoff);
        let heuristic = if config.heuristic_strict {
            NounHeuristic::strict()
        } else {
            NounHeuristic::lenient()
        };
        Self::new(
            store,
            client,
            config.profile(AnalysisKind::Sentiment),
            config.profile(AnalysisKind::NounDensity),
            sink,
        )
        .with_heuristic(heuristic)
        .with_default_token(config.api_token.clone())
    }

    pub fn with_heuristic(mut self, heuristic: NounHeuristic) -> Self {
        self.interpreter = ResponseInterpreter::new(heuristic);
        self
    }

    /// Token used when a request does not bring its own.
    pub fn with_default_token(mut self, token: Option<String>) -> Self {
        self.default_token = token;
        self
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn profile(&self, kind: AnalysisKind) -> &AnalysisProfile {
        match kind {
            AnalysisKind::Sentiment => &self.sentiment,
            AnalysisKind::NounDensity => &self.nouns,
        }
    }

    pub fn review_count(&self) -> usize {
        self.store.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn current_review(&self) -> Option<Review> {
        self.selection().current.clone()
    }

    pub fn generation(&self) -> u64 {
        self.selection().generation
    }

    /// Picks a new review and invalidates any analysis still in flight.
    pub fn select_random_review(&self) -> Result<Review, AnalysisError> {
        let review = self
            .store
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sample()?
            .clone();

        let mut selection = self.selection();
        selection.generation += 1;
        selection.current = Some(review.clone());
        self.sink.clear();
        info!("🎲 Selected review (generation {})", selection.generation);
        Ok(review)
    }

    /// Re-fetches the corpus and clears the current selection.
    pub async fn reload(&self, provider: &dyn ReviewProvider) -> Result<usize, CorpusError> {
        let store = reviews::load_from(provider).await?;
        let count = store.len();
        *self.store.write().unwrap_or_else(PoisonError::into_inner) = store;

        let mut selection = self.selection();
        selection.generation += 1;
        selection.current = None;
        self.sink.clear();
        Ok(count)
    }

    /// Analyzes the current review. A report is always produced for a request
    /// that runs to completion, with `Unknown` when no verdict could be made.
    pub async fn analyze(
        &self,
        kind: AnalysisKind,
        token_override: Option<&str>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let (ticket, review) = {
            let mut selection = self.selection();
            let review = selection
                .current
                .clone()
                .ok_or(AnalysisError::NoReviewSelected)?;
            selection.generation += 1;
            (selection.generation, review)
        };

        let _in_flight = self.in_flight.lock().await;
        if self.generation() != ticket {
            info!("⏭️ Skipping queued {} analysis, a newer request arrived", kind.as_str());
            return Err(AnalysisError::Superseded);
        }

        let profile = self.profile(kind);
        let payload = InferenceClient::request_body(&profile.prompt.render(&review.text));
        let token = token_override
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or(self.default_token.as_deref());

        info!(
            "🧠 Analyzing {} with {} candidate model(s)",
            profile.kind.as_str(),
            profile.endpoints.len()
        );
        let outcome = self
            .client
            .invoke_with_fallback(&profile.endpoints, &payload, token)
            .await;
        let interpretation = self.interpreter.interpret(outcome, kind, &review.text);

        let report = AnalysisReport {
            id: Uuid::new_v4(),
            kind,
            review_text: review.text,
            interpretation,
            analyzed_at: Utc::now(),
        };

        let selection = self.selection();
        if selection.generation != ticket {
            warn!("🗑️ Discarding stale {} result {}", kind.as_str(), report.id);
            return Err(AnalysisError::Superseded);
        }
        self.sink.deliver(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InferenceTransport, ModelEndpoint, RawResponse};
    use crate::config::PromptTemplate;
    use crate::error::HttpFailure;
    use crate::interpret::{Category, Sentiment};
    use crate::nouns::NounDensity;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{oneshot, Notify};

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<AnalysisReport>>,
    }

    impl RecordingSink {
        fn verdicts(&self) -> Vec<Verdict> {
            self.reports.lock().unwrap().iter().map(|r| r.verdict()).collect()
        }
    }

    impl ResultSink for RecordingSink {
        fn deliver(&self, report: &AnalysisReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    /// Answers every request with the same status and body, recording prompts and tokens.
    struct FixedTransport {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<(Value, Option<String>)>>,
    }

    impl FixedTransport {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self { status, body, seen: Mutex::default() })
        }
    }

    #[async_trait]
    impl InferenceTransport for FixedTransport {
        async fn post_json(&self, _: &str, payload: &Value, token: Option<&str>) -> Result<RawResponse, HttpFailure> {
            self.seen
                .lock()
                .unwrap()
                .push((payload.clone(), token.map(str::to_string)));
            Ok(RawResponse { status: self.status, body: self.body.to_string() })
        }
    }

    /// First call blocks until released and answers POSITIVE; later calls answer NEGATIVE at once.
    struct GatedTransport {
        entered: Notify,
        gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceTransport for GatedTransport {
        async fn post_json(&self, _: &str, _: &Value, _: Option<&str>) -> Result<RawResponse, HttpFailure> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.entered.notify_one();
                if let Some(gate) = self.gate.lock().await.take() {
                    let _ = gate.await;
                }
                return Ok(RawResponse { status: 200, body: r#"{"label":"POSITIVE"}"#.to_string() });
            }
            Ok(RawResponse { status: 200, body: r#"{"label":"NEGATIVE"}"#.to_string() })
        }
    }

    fn profile(kind: AnalysisKind, prompt: &str) -> AnalysisProfile {
        AnalysisProfile {
            kind,
            endpoints: vec![ModelEndpoint::for_model("https://api.test", "primary")],
            prompt: PromptTemplate::new(prompt),
        }
    }

    fn controller(
        corpus: &str,
        transport: Arc<dyn InferenceTransport>,
        sink: Arc<dyn ResultSink>,
    ) -> AnalysisController {
        AnalysisController::new(
            ReviewStore::load(corpus).unwrap(),
            InferenceClient::with_transport(transport, Duration::from_secs(5)),
            profile(AnalysisKind::Sentiment, "{review}"),
            profile(AnalysisKind::NounDensity, "Count the nouns: {review}"),
            sink,
        )
    }

    const ONE_REVIEW: &str = "id\ttext\n1\tThe kettle boils fast\n";

    #[tokio::test]
    async fn test_analyze_requires_selection() {
        let ctl = controller(ONE_REVIEW, FixedTransport::new(200, "{}"), Arc::new(TracingSink));
        assert_eq!(
            ctl.analyze(AnalysisKind::Sentiment, None).await.unwrap_err(),
            AnalysisError::NoReviewSelected
        );
    }

    #[test]
    fn test_select_from_empty_corpus() {
        let ctl = controller("id\ttext\n1\t\n", FixedTransport::new(200, "{}"), Arc::new(TracingSink));
        assert_eq!(
            ctl.select_random_review().unwrap_err(),
            AnalysisError::Corpus(CorpusError::Empty)
        );
    }

    #[tokio::test]
    async fn test_sentiment_flow_delivers_report() {
        let transport = FixedTransport::new(200, r#"[[{"label":"POSITIVE","score":0.98}]]"#);
        let sink = Arc::new(RecordingSink::default());
        let ctl = controller(ONE_REVIEW, transport.clone(), sink.clone())
            .with_default_token(Some("hf_env".to_string()));

        ctl.select_random_review().unwrap();
        let report = ctl.analyze(AnalysisKind::Sentiment, None).await.unwrap();

        assert_eq!(report.verdict(), Verdict::Sentiment(Sentiment::Positive));
        assert_eq!(report.review_text, "The kettle boils fast");
        assert_eq!(sink.verdicts(), vec![Verdict::Sentiment(Sentiment::Positive)]);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0["inputs"], "The kettle boils fast");
        assert_eq!(seen[0].1.as_deref(), Some("hf_env"));
    }

    #[tokio::test]
    async fn test_token_override_and_prompt_template() {
        let transport = FixedTransport::new(200, r#"{"generated_text":"low"}"#);
        let ctl = controller(ONE_REVIEW, transport.clone(), Arc::new(TracingSink))
            .with_default_token(Some("hf_env".to_string()));

        ctl.select_random_review().unwrap();
        let report = ctl.analyze(AnalysisKind::NounDensity, Some(" hf_user ")).await.unwrap();
        assert_eq!(report.verdict(), Verdict::NounDensity(NounDensity::Low));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0["inputs"], "Count the nouns: The kettle boils fast");
        assert_eq!(seen[0].1.as_deref(), Some("hf_user"));
    }

    #[tokio::test]
    async fn test_http_error_still_completes_with_unknown() {
        let sink = Arc::new(RecordingSink::default());
        let ctl = controller(ONE_REVIEW, FixedTransport::new(503, ""), sink.clone());

        ctl.select_random_review().unwrap();
        let report = ctl.analyze(AnalysisKind::Sentiment, None).await.unwrap();
        assert_eq!(report.verdict(), Verdict::Sentiment(Sentiment::Unknown));
        assert_eq!(report.interpretation.category, Category::Http(HttpFailure::ModelLoading));
        assert_eq!(report.message(), "Model is loading. Please try again in a few seconds.");

        // The lock was released, so the user can retry right away.
        assert!(ctl.analyze(AnalysisKind::Sentiment, None).await.is_ok());
        assert_eq!(sink.verdicts().len(), 2);
    }

    #[tokio::test]
    async fn test_late_first_result_does_not_overwrite_second() {
        let (release, gate) = oneshot::channel();
        let transport = Arc::new(GatedTransport {
            entered: Notify::new(),
            gate: tokio::sync::Mutex::new(Some(gate)),
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink::default());
        let ctl = Arc::new(controller(ONE_REVIEW, transport.clone(), sink.clone()));
        ctl.select_random_review().unwrap();

        let first = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.analyze(AnalysisKind::Sentiment, None).await }
        });
        transport.entered.notified().await;

        let second = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.analyze(AnalysisKind::Sentiment, None).await }
        });
        while ctl.generation() < 3 {
            tokio::task::yield_now().await;
        }

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap_err(), AnalysisError::Superseded);
        let second = second.await.unwrap().unwrap();

        assert_eq!(second.verdict(), Verdict::Sentiment(Sentiment::Negative));
        assert_eq!(sink.verdicts(), vec![Verdict::Sentiment(Sentiment::Negative)]);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_new_selection_cancels_in_flight_write() {
        let (release, gate) = oneshot::channel();
        let transport = Arc::new(GatedTransport {
            entered: Notify::new(),
            gate: tokio::sync::Mutex::new(Some(gate)),
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink::default());
        let ctl = Arc::new(controller(ONE_REVIEW, transport.clone(), sink.clone()));
        ctl.select_random_review().unwrap();

        let pending = tokio::spawn({
            let ctl = ctl.clone();
            async move { ctl.analyze(AnalysisKind::Sentiment, None).await }
        });
        transport.entered.notified().await;
        ctl.select_random_review().unwrap();
        release.send(()).unwrap();

        assert_eq!(pending.await.unwrap().unwrap_err(), AnalysisError::Superseded);
        assert!(sink.verdicts().is_empty());
    }

    #[tokio::test]
    async fn test_reload_replaces_corpus_and_clears_selection() {
        let ctl = controller(ONE_REVIEW, FixedTransport::new(200, "{}"), Arc::new(TracingSink));
        ctl.select_random_review().unwrap();

        let path = std::env::temp_dir().join(format!("reload-{}.tsv", Uuid::new_v4()));
        tokio::fs::write(&path, "text\na\nb\n").await.unwrap();
        let provider = reviews::FileReviewProvider { path: path.clone() };

        assert_eq!(ctl.reload(&provider).await.unwrap(), 2);
        assert_eq!(ctl.review_count(), 2);
        assert!(ctl.current_review().is_none());
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[test]
    fn test_fan_out_reaches_latest_result() {
        let latest = LatestResult::default();
        assert!(latest.get().is_none());
        let report = AnalysisReport {
            id: Uuid::new_v4(),
            kind: AnalysisKind::NounDensity,
            review_text: "x".to_string(),
            interpretation: Interpretation {
                verdict: Verdict::NounDensity(NounDensity::Medium),
                category: Category::HeuristicFallback,
                confidence: None,
                raw_label: None,
            },
            analyzed_at: Utc::now(),
        };
        let latest = Arc::new(latest);
        let sinks: Vec<Arc<dyn ResultSink>> = vec![Arc::new(TracingSink), latest.clone()];
        FanOut(sinks).deliver(&report);
        assert_eq!(latest.get().map(|r| r.id), Some(report.id));
    }

    #[tokio::test]
    async fn test_new_selection_and_reload_clear_latest_result() {
        let latest = Arc::new(LatestResult::default());
        let ctl = controller(
            "text\nfirst review\n",
            FixedTransport::new(200, r#"{"label":"NEGATIVE"}"#),
            latest.clone(),
        );

        ctl.select_random_review().unwrap();
        ctl.analyze(AnalysisKind::Sentiment, None).await.unwrap();
        assert_eq!(latest.get().unwrap().review_text, "first review");

        ctl.select_random_review().unwrap();
        assert!(latest.get().is_none());

        ctl.analyze(AnalysisKind::Sentiment, None).await.unwrap();
        assert!(latest.get().is_some());

        let path = std::env::temp_dir().join(format!("clear-{}.tsv", Uuid::new_v4()));
        tokio::fs::write(&path, "text\nsecond review\n").await.unwrap();
        let provider = reviews::FileReviewProvider { path: path.clone() };
        ctl.reload(&provider).await.unwrap();
        assert!(latest.get().is_none());
        let _ = tokio::fs::remove_file(&path).await;
    }
}
