//! Confidence Analyzer
//!
//! Runs when a prediction's confidence falls below the analysis gate and names
//! the single noun in the current turn that most influenced the prediction.
//! The attribution service is flaky, so calls are retried a bounded number of
//! times and every failed attempt falls back to a uniform low score over the
//! raw utterance. This path never fails the turn because of attribution.

pub mod nouns;

pub use nouns::{LexiconNounFilter, NounFilter};

use crate::cache::{CacheNamespace, Memoizer};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::key::{CacheKey, TURN_SEPARATOR};
use crate::schema::{ParserContext, Preprocessor};
use crate::services::{Attribution, AttributionEngine, AttributionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Tokens the attribution engine emits for the leading `<s>` of the input.
const SEPARATOR_PREFIX_TOKENS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "raw_input")]
    pub ambiguous_token: String,
    #[serde(rename = "word_attributions")]
    pub attribution_score: f64,
}

/// Everything the analyzer needs about the turn being analysed.
pub struct AnalysisRequest<'a> {
    pub key: &'a CacheKey,
    /// Separator-prefixed utterance plus history
    pub input_text: &'a str,
    pub utterance: &'a str,
    pub db_id: &'a str,
    /// Parser context from this turn, absent when the SQL came from cache
    pub context: Option<&'a ParserContext>,
}

pub struct ConfidenceAnalyzer {
    memo: Arc<Memoizer>,
    preprocessor: Arc<Preprocessor>,
    engine: Arc<dyn AttributionEngine>,
    nouns: Arc<dyn NounFilter>,
    config: AnalysisConfig,
}

impl ConfidenceAnalyzer {
    pub fn new(
        memo: Arc<Memoizer>,
        preprocessor: Arc<Preprocessor>,
        engine: Arc<dyn AttributionEngine>,
        nouns: Arc<dyn NounFilter>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            memo,
            preprocessor,
            engine,
            nouns,
            config,
        }
    }

    pub async fn analyze(&self, request: AnalysisRequest<'_>) -> Result<AnalysisResult> {
        if let Some(cached) = self
            .memo
            .lookup::<AnalysisResult>(CacheNamespace::Analysis, request.key)
            .await?
        {
            return Ok(cached);
        }

        // The parser context is not cached with the SQL answer; rebuild it after a hit.
        let recomputed;
        let context = match request.context {
            Some(context) => context,
            None => {
                recomputed = self.preprocessor.run(request.input_text, request.db_id)?;
                &recomputed
            }
        };

        let (words, scores) = self
            .noun_scores_with_retry(request.input_text, request.utterance, context)
            .await;
        debug!("Noun words: {:?}, scores: {:?}", words, scores);

        let result = select_most_ambiguous(&words, &scores);
        info!(
            "Most ambiguous token: '{}' ({:.4})",
            result.ambiguous_token, result.attribution_score
        );

        self.memo.store(CacheNamespace::Analysis, request.key, &result).await?;
        Ok(result)
    }

    /// Attribution with bounded retries. Infallible by construction.
    async fn noun_scores_with_retry(
        &self,
        input_text: &str,
        utterance: &str,
        context: &ParserContext,
    ) -> (Vec<String>, Vec<f64>) {
        let mut remaining = self.config.max_attempts;
        let mut reduced = None;

        while remaining > 0 {
            let attempt = self.config.max_attempts - remaining + 1;
            debug!("Attribution attempt {} of {}", attempt, self.config.max_attempts);

            match self.engine.attribute(input_text, context).await {
                Ok(attribution) => match self.reduce_attribution(attribution) {
                    Ok(nouns) => {
                        reduced = Some(nouns);
                        break;
                    }
                    Err(e) => {
                        error!("Attribution unusable, falling back to uniform scores: {}", e);
                        reduced = Some(self.uniform_fallback(utterance));
                        break;
                    }
                },
                Err(AttributionError::Upstream(reason)) => {
                    warn!("Attribution attempt {} failed: {}", attempt, reason);
                    reduced = Some(self.uniform_fallback(utterance));
                    remaining -= 1;
                }
                Err(e @ AttributionError::Malformed(_)) => {
                    // Retrying will not fix a contract violation.
                    error!("Attribution unusable, falling back to uniform scores: {}", e);
                    reduced = Some(self.uniform_fallback(utterance));
                    break;
                }
            }
        }

        reduced.unwrap_or_else(|| self.uniform_fallback(utterance))
    }

    /// Keep only the current turn's tokens and reduce them to nouns.
    fn reduce_attribution(
        &self,
        attribution: Attribution,
    ) -> std::result::Result<(Vec<String>, Vec<f64>), AttributionError> {
        let Attribution { tokens, scores } = attribution;
        if tokens.len() != scores.len() {
            return Err(AttributionError::Malformed(format!(
                "{} tokens but {} scores",
                tokens.len(),
                scores.len()
            )));
        }

        let separators = separator_positions(&tokens);
        let end = if separators.len() > 1 { separators[1] } else { tokens.len() };
        let start = SEPARATOR_PREFIX_TOKENS.min(end);

        Ok(self.nouns.reduce(&tokens[start..end], &scores[start..end]))
    }

    fn uniform_fallback(&self, utterance: &str) -> (Vec<String>, Vec<f64>) {
        let tokens: Vec<String> = utterance.split(' ').map(str::to_string).collect();
        let scores = vec![self.config.fallback_score; tokens.len()];
        self.nouns.reduce(&tokens, &scores)
    }
}

/// Start index of every turn separator in an attribution token stream.
///
/// The word-piece tokenizer splits `<s>` into `<`, `s`, `>`; a whole `<s>`
/// token is accepted as well.
fn separator_positions(tokens: &[String]) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter_map(|(i, token)| {
            if token == TURN_SEPARATOR {
                Some(i)
            } else if token == "s" && i > 0 && tokens[i - 1] == "<" {
                Some(i - 1)
            } else {
                None
            }
        })
        .collect()
}

/// Pick the highest scoring noun; ties go to the first occurrence.
pub fn select_most_ambiguous(words: &[String], scores: &[f64]) -> AnalysisResult {
    let highest = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    words
        .iter()
        .zip(scores)
        .find(|(_, score)| **score == highest)
        .map(|(word, _)| AnalysisResult {
            ambiguous_token: word.clone(),
            attribution_score: highest,
        })
        .unwrap_or(AnalysisResult {
            ambiguous_token: String::new(),
            attribution_score: 0.0,
        })
}
