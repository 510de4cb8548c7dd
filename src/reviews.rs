//! Review corpus loading and random sampling.
//!
//! The corpus is a tab-separated file whose header names a `text` column.
//! Rows with an empty or whitespace-only `text` field are dropped at load time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::error::CorpusError;

const TEXT_COLUMN: &str = "text";

/// A single review. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub text: String,
}

/// Parsed review corpus.
#[derive(Debug, Clone, Default)]
pub struct ReviewStore {
    reviews: Vec<Review>,
}

impl ReviewStore {
    /// Parse raw TSV into a store, keeping row order.
    pub fn load(raw_tsv: &str) -> Result<Self, CorpusError> {
        let raw = raw_tsv.strip_prefix('\u{feff}').unwrap_or(raw_tsv);
        let mut lines = raw
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| CorpusError::Parse("missing header row".to_string()))?;

        let text_idx = header
            .split('\t')
            .position(|column| unquote(column).trim() == TEXT_COLUMN)
            .ok_or_else(|| {
                CorpusError::Parse(format!("header has no '{}' column", TEXT_COLUMN))
            })?;

        let reviews: Vec<Review> = lines
            .filter_map(|line| line.split('\t').nth(text_idx))
            .map(unquote)
            .filter(|text| !text.trim().is_empty())
            .map(|text| Review { text })
            .collect();

        Ok(Self { reviews })
    }

    /// Uniformly random review from the thread RNG.
    pub fn sample(&self) -> Result<&Review, CorpusError> {
        self.sample_with(&mut rand::thread_rng())
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<&Review, CorpusError> {
        self.reviews.choose(rng).ok_or(CorpusError::Empty)
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }
}

fn unquote(field: &str) -> String {
    let trimmed = field.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\"\"", "\"")
    } else {
        field.to_string()
    }
}

/// Source of the raw corpus text.
#[async_trait]
pub trait ReviewProvider: Send + Sync {
    async fn fetch_raw_corpus(&self) -> Result<String>;
}

/// Reads the corpus from a local file.
pub struct FileReviewProvider {
    pub path: PathBuf,
}

#[async_trait]
impl ReviewProvider for FileReviewProvider {
    async fn fetch_raw_corpus(&self) -> Result<String> {
        info!("📂 Reading reviews from {}", self.path.display());
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))
    }
}

/// Fetches the corpus from a static URL.
pub struct HttpReviewProvider {
    pub url: String,
    client: reqwest::Client,
}

impl HttpReviewProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReviewProvider for HttpReviewProvider {
    async fn fetch_raw_corpus(&self) -> Result<String> {
        info!("🌐 Fetching reviews from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("GET {} returned {}", self.url, response.status());
        }
        Ok(response.text().await?)
    }
}

/// Picks a provider for a configured source: URLs go over HTTP, anything else is a path.
pub fn provider_for(source: &str) -> Box<dyn ReviewProvider> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Box::new(HttpReviewProvider::new(source))
    } else {
        Box::new(FileReviewProvider {
            path: PathBuf::from(source),
        })
    }
}

/// Fetch through `provider` and parse.
pub async fn load_from(provider: &dyn ReviewProvider) -> Result<ReviewStore, CorpusError> {
    let raw = provider
        .fetch_raw_corpus()
        .await
        .map_err(|e| CorpusError::Fetch(format!("{:#}", e)))?;
    let store = ReviewStore::load(&raw)?;
    info!("📚 Loaded {} reviews", store.len());
    Ok(store)
}
