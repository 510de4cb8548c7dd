//! Offline noun-density heuristic.
//!
//! Used only when the remote model's answer cannot be turned into a bucket.
//! This is not a part-of-speech tagger: a word counts as noun-like if it is a
//! known common noun, or if it passes a cheap shape test.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Counts above this are `High`.
pub const HIGH_THRESHOLD: usize = 15;
/// Counts at or above this (and not `High`) are `Medium`.
pub const MEDIUM_THRESHOLD: usize = 6;

// Common nouns accepted regardless of shape
static COMMON_NOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    vec![
        "time", "day", "week", "month", "year", "people", "person", "man", "woman", "child",
        "kid", "kids", "family", "friend", "friends", "home", "house", "room", "car", "job",
        "work", "money", "price", "cost", "value", "product", "products", "item", "items",
        "order", "box", "bag", "size", "color", "colour", "quality", "design", "material",
        "battery", "screen", "phone", "camera", "charger", "cable", "button", "display",
        "speaker", "sound", "picture", "photo", "manual", "package", "packaging", "delivery",
        "shipping", "store", "shop", "seller", "service", "support", "company", "brand",
        "book", "story", "author", "movie", "film", "show", "music", "song", "game", "food",
        "taste", "water", "coffee", "tea", "hair", "skin", "face", "eye", "eyes", "hand",
        "way", "thing", "things", "part", "parts", "problem", "issue", "use", "fit", "gift",
        "review", "star", "stars", "set", "kit", "tool", "tools", "lid", "cup", "pot", "pan",
    ]
    .into_iter()
    .collect()
});

// Determiners, conjunctions, pronouns and other function words long enough to pass the shape test
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    vec![
        "the", "a", "an", "this", "that", "these", "those", "is", "are", "was", "were",
        "and", "but", "or", "nor", "for", "yet", "so", "with", "without", "from", "into",
        "onto", "upon", "about", "above", "below", "after", "before", "during", "through",
        "over", "under", "between", "against", "because", "though", "although", "while",
        "when", "where", "which", "what", "whom", "whose", "there", "their", "theirs", "they",
        "them", "then", "than", "have", "has", "had", "having", "been", "being", "will",
        "would", "could", "should", "shall", "might", "must", "does", "doing", "done", "your",
        "yours", "mine", "ours", "ourselves", "myself", "yourself", "himself", "herself",
        "itself", "themselves", "some", "such", "each", "every", "other", "another", "more",
        "most", "much", "many", "very", "really", "just", "only", "also", "even", "still",
        "again", "ever", "never", "always", "here", "well", "like", "both", "either",
        "neither", "same", "once", "twice", "dont", "didnt", "doesnt", "isnt", "wasnt",
        "cant", "wont", "don't", "didn't", "doesn't", "isn't", "wasn't", "can't", "won't",
        "it's", "i'm", "i've", "you're", "they're", "that's", "great", "good", "nice",
        "bad", "love", "loved", "make", "made", "get", "got", "went", "came", "said", "want",
        "need", "know", "think", "thought", "tried", "take", "took", "give", "gave", "come",
        "keep", "kept", "seem", "seems", "within", "until", "since", "whether",
    ]
    .into_iter()
    .collect()
});

const VERBAL_SUFFIXES: &[&str] = &["ing", "ed", "ly", "es"];

/// Coarse noun-density classification. `Unknown` is the explicit absence case
/// and is never produced by [`NounHeuristic::bucket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NounDensity {
    High,
    Medium,
    Low,
    Unknown,
}

impl NounDensity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NounDensity::High => "High",
            NounDensity::Medium => "Medium",
            NounDensity::Low => "Low",
            NounDensity::Unknown => "Unknown",
        }
    }
}

/// Token-level noun estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NounHeuristic {
    /// Reject shape-test candidates ending in a verbal or adverbial suffix.
    pub strict: bool,
}

impl Default for NounHeuristic {
    fn default() -> Self {
        Self::strict()
    }
}

impl NounHeuristic {
    pub fn strict() -> Self {
        Self { strict: true }
    }

    pub fn lenient() -> Self {
        Self { strict: false }
    }

    /// Number of distinct noun-like words in `text`.
    pub fn estimate(&self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        lowered
            .split_whitespace()
            .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|word| !word.is_empty())
            .filter(|word| self.is_noun_like(word))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Expects an already lower-cased, punctuation-trimmed word.
    pub fn is_noun_like(&self, word: &str) -> bool {
        if COMMON_NOUNS.contains(word) {
            return true;
        }
        if word.chars().count() <= 3 || word.chars().any(|c| c.is_ascii_digit()) {
            return false;
        }
        if STOP_WORDS.contains(word) {
            return false;
        }
        !(self.strict && VERBAL_SUFFIXES.iter().any(|suffix| word.ends_with(suffix)))
    }

    pub fn bucket(count: usize) -> NounDensity {
        if count > HIGH_THRESHOLD {
            NounDensity::High
        } else if count >= MEDIUM_THRESHOLD {
            NounDensity::Medium
        } else {
            NounDensity::Low
        }
    }

    /// `bucket(estimate(text))`.
    pub fn classify(&self, text: &str) -> NounDensity {
        Self::bucket(self.estimate(text))
    }
}
