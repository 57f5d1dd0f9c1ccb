//! User Intent Resolver
//!
//! Secondary intent inference over the same cache key as the SQL answer, kept
//! in its own namespace.

use crate::cache::{CacheNamespace, Memoizer};
use crate::error::{OrchestratorError, Result};
use crate::key::{self, CacheKey};
use crate::schema::Preprocessor;
use crate::services::IntentClassifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Label emitted by the intent classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserIntent {
    Query,
    DatabaseTuning,
    Other(String),
}

impl UserIntent {
    pub fn as_str(&self) -> &str {
        match self {
            UserIntent::Query => "query",
            UserIntent::DatabaseTuning => "database_tuning",
            UserIntent::Other(label) => label,
        }
    }
}

impl From<String> for UserIntent {
    fn from(label: String) -> Self {
        match label.as_str() {
            "query" => UserIntent::Query,
            "database_tuning" => UserIntent::DatabaseTuning,
            _ => UserIntent::Other(label),
        }
    }
}

impl From<UserIntent> for String {
    fn from(intent: UserIntent) -> Self {
        intent.as_str().to_string()
    }
}

impl fmt::Display for UserIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct UserIntentResolver {
    memo: Arc<Memoizer>,
    preprocessor: Arc<Preprocessor>,
    classifier: Arc<dyn IntentClassifier>,
}

impl UserIntentResolver {
    pub fn new(
        memo: Arc<Memoizer>,
        preprocessor: Arc<Preprocessor>,
        classifier: Arc<dyn IntentClassifier>,
    ) -> Self {
        Self {
            memo,
            preprocessor,
            classifier,
        }
    }

    /// `input_text` is the separator-prefixed utterance plus history.
    pub async fn resolve_intent(&self, key: &CacheKey, input_text: &str, db_id: &str) -> Result<UserIntent> {
        if let Some(intent) = self
            .memo
            .lookup::<UserIntent>(CacheNamespace::UserIntent, key)
            .await?
        {
            return Ok(intent);
        }

        let classifier_text = key::classifier_input(input_text);
        let context = self.preprocessor.run(&classifier_text, db_id)?;
        let labels = self.classifier.classify(&context).await?;

        let intent = labels
            .into_iter()
            .next()
            .map(UserIntent::from)
            .ok_or_else(|| OrchestratorError::upstream("intent classifier", "no labels returned"))?;
        debug!("Classified '{}' as {}", classifier_text, intent);

        self.memo.store(CacheNamespace::UserIntent, key, &intent).await?;
        Ok(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_strings() {
        assert_eq!(UserIntent::from("query".to_string()), UserIntent::Query);
        assert_eq!(
            UserIntent::from("ask_clarification".to_string()),
            UserIntent::Other("ask_clarification".to_string())
        );
        assert_eq!(serde_json::to_string(&UserIntent::DatabaseTuning).unwrap(), "\"database_tuning\"");
    }
}
