//! Random review sampling with remote sentiment and noun-density analysis.
//!
//! Remote answers are normalized by [`interpret::ResponseInterpreter`]; when a
//! noun-density answer is unusable, [`nouns::NounHeuristic`] estimates it offline.

pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod interpret;
pub mod nouns;
pub mod reviews;
