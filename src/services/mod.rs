//! External inference services
//!
//! Every model the orchestrator depends on is reached over the network. The
//! traits here are the seams; `http` holds the reqwest clients used in
//! production, tests substitute in-process fakes.

pub mod http;

pub use http::{
    HttpAttributionEngine, HttpIntentClassifier, HttpSemanticParser, HttpTextGenerator,
    HttpTuningDetector,
};

use crate::error::Result;
use crate::schema::ParserContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One scored candidate parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    #[serde(rename = "inferred_code")]
    pub sql: String,
    pub score: f64,
}

/// Per-token importance scores; `tokens` and `scores` have equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub tokens: Vec<String>,
    pub scores: Vec<f64>,
}

/// Attribution failures, split by whether another attempt can help.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributionError {
    /// Service unreachable, timed out or returned an error status
    #[error("attribution service failed: {0}")]
    Upstream(String),

    /// Service answered with a payload that violates the contract
    #[error("malformed attribution response: {0}")]
    Malformed(String),
}

/// Semantic parser producing ranked SQL candidates.
#[async_trait]
pub trait SemanticParser: Send + Sync {
    async fn parse(&self, context: &ParserContext) -> Result<Vec<Beam>>;
}

/// Intent classifier over the conversation text.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Predicted labels, best first.
    async fn classify(&self, context: &ParserContext) -> Result<Vec<String>>;
}

/// Decides whether an utterance asks for database maintenance.
#[async_trait]
pub trait TuningDetector: Send + Sync {
    async fn is_tuning(&self, utterance: &str, db_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait AttributionEngine: Send + Sync {
    async fn attribute(
        &self,
        input_text: &str,
        context: &ParserContext,
    ) -> std::result::Result<Attribution, AttributionError>;
}

/// Large language model text generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_new_tokens: u32, temperature: f32) -> Result<String>;
}
