//! Turn request and response shapes, and the assembler that merges the
//! pipeline stages into the final response.

use crate::analysis::AnalysisResult;
use crate::query_resolver::ResolvedQuery;
use crate::session::DEFAULT_SESSION_ID;
use crate::user_intent::UserIntent;
use serde::{Deserialize, Serialize};

pub const TUNING_SQL: &str = "conduct tuning";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub text: String,
    pub db_id: String,
    #[serde(default = "default_analyse")]
    pub analyse: bool,
    #[serde(default)]
    pub reset_history: bool,
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

fn default_analyse() -> bool {
    true
}

fn default_session_id() -> String {
    DEFAULT_SESSION_ID.to_string()
}

impl TurnRequest {
    pub fn new(text: impl Into<String>, db_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            db_id: db_id.into(),
            analyse: default_analyse(),
            reset_history: false,
            session_id: default_session_id(),
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub pred_sql: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub analyse_result: Option<AnalysisResult>,
    pub user_intent: UserIntent,
}

impl TurnResponse {
    /// Fixed answer for database maintenance requests.
    pub fn tuning() -> Self {
        Self {
            pred_sql: TUNING_SQL.to_string(),
            confidence: 100.0,
            analyse_result: None,
            user_intent: UserIntent::DatabaseTuning,
        }
    }
}

/// Structural merge of the stage outputs.
pub struct ResponseAssembler;

impl ResponseAssembler {
    /// `analysis` is only present when the confidence gate triggered it.
    pub fn assemble(query: ResolvedQuery, analysis: Option<AnalysisResult>, intent: UserIntent) -> TurnResponse {
        TurnResponse {
            pred_sql: query.predicted_sql,
            confidence: query.confidence,
            analyse_result: analysis,
            user_intent: intent,
        }
    }
}
