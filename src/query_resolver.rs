//! Query Resolver
//!
//! Turns the current utterance plus history into a SQL candidate and a
//! confidence score, memoized per cache key in the text2sql namespace.

use crate::cache::{CacheNamespace, Memoizer};
use crate::config::Thresholds;
use crate::error::{OrchestratorError, Result};
use crate::key::{self, CacheKey};
use crate::schema::{ParserContext, Preprocessor};
use crate::services::SemanticParser;
use crate::value_filler::ValueFiller;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Top SQL candidate with its adjusted confidence on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    #[serde(rename = "pred_sql")]
    pub predicted_sql: String,
    pub confidence: f64,
}

/// Outcome of one resolve call.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub key: CacheKey,
    /// Separator-prefixed utterance plus history
    pub input_text: String,
    pub query: ResolvedQuery,
    /// Only present when the parser actually ran; not persisted with the answer
    pub context: Option<ParserContext>,
    pub cache_hit: bool,
}

pub struct QueryResolver {
    memo: Arc<Memoizer>,
    preprocessor: Arc<Preprocessor>,
    parser: Arc<dyn SemanticParser>,
    filler: ValueFiller,
    thresholds: Thresholds,
}

impl QueryResolver {
    pub fn new(
        memo: Arc<Memoizer>,
        preprocessor: Arc<Preprocessor>,
        parser: Arc<dyn SemanticParser>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            memo,
            preprocessor,
            parser,
            filler: ValueFiller::new(),
            thresholds,
        }
    }

    pub async fn resolve(&self, utterance: &str, history_snapshot: &str, db_id: &str) -> Result<Resolution> {
        let key = key::derive(utterance, history_snapshot, db_id);
        let input_text = key::prefixed_input(utterance, history_snapshot);

        if let Some(query) = self
            .memo
            .lookup::<ResolvedQuery>(CacheNamespace::Text2Sql, &key)
            .await?
        {
            info!("Returning cached SQL for '{}'", utterance);
            return Ok(Resolution {
                key,
                input_text,
                query,
                context: None,
                cache_hit: true,
            });
        }

        let context = self.preprocessor.run(&input_text, db_id)?;
        let beams = self.parser.parse(&context).await?;
        let top = beams
            .first()
            .ok_or_else(|| OrchestratorError::NoCandidates(db_id.to_string()))?;

        let scores: Vec<f64> = beams.iter().map(|b| b.score).collect();
        let base_confidence = softmax_top(&scores);

        let sql = self.filler.fill(&top.sql, utterance, db_id, history_snapshot);
        let confidence = adjust_confidence(&sql, base_confidence, &self.thresholds);
        debug!(
            "Parsed {} beams, base confidence {:.4}, adjusted {:.4}",
            beams.len(),
            base_confidence,
            confidence
        );

        let query = ResolvedQuery {
            predicted_sql: sql,
            confidence: to_percent(confidence),
        };
        self.memo.store(CacheNamespace::Text2Sql, &key, &query).await?;

        Ok(Resolution {
            key,
            input_text,
            query,
            context: Some(context),
            cache_hit: false,
        })
    }
}

/// Probability of the first beam under a softmax over all beam scores.
pub fn softmax_top(scores: &[f64]) -> f64 {
    let Some(&first) = scores.first() else {
        return 0.0;
    };
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    // All beams at -inf (or any at +inf) leave nothing to normalize against.
    if !max.is_finite() {
        return 0.0;
    }
    let total: f64 = scores.iter().map(|s| (s - max).exp()).sum();
    let probability = (first - max).exp() / total;
    if probability.is_finite() {
        probability
    } else {
        0.0
    }
}

/// Boost under-scored conditional-clause predictions.
///
/// SQL containing `where` (any case) and no leftover `terminal` placeholder
/// gains `boost_amount` when below `boost_ceiling`, capped at 1.0. This is an
/// empirically tuned correction for the base model, kept as a policy knob.
pub fn adjust_confidence(sql: &str, confidence: f64, thresholds: &Thresholds) -> f64 {
    let lowered = sql.to_lowercase();
    if lowered.contains("where") && !lowered.contains("terminal") && confidence < thresholds.boost_ceiling {
        (confidence + thresholds.boost_amount).min(1.0)
    } else {
        confidence
    }
}

/// 0-1 probability to a 0-100 score with two decimals.
fn to_percent(confidence: f64) -> f64 {
    if !confidence.is_finite() {
        return 0.0;
    }
    ((confidence * 100.0 * 100.0).round() / 100.0).clamp(0.0, 100.0)
}
