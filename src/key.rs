//! Cache key derivation
//!
//! Keys are the plain concatenation of the separator-prefixed utterance, the
//! session history and the database id. No delimiter or hashing is applied, so
//! distinct triples whose concatenations coincide share a key; changing that
//! would change which cached answers existing deployments serve.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker placed in front of every turn.
pub const TURN_SEPARATOR: &str = "<s>";

/// Marker that replaces turn separators in the intent classifier input.
pub const CLASSIFICATION_MARKER: &str = "[CLS]";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key for the table summarization namespace: the serialized rows.
    pub fn for_table(rows: &serde_json::Value) -> Self {
        CacheKey(rows.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `"<s> " + utterance + history`, the text the parser and attribution engine see.
pub fn prefixed_input(utterance: &str, history_snapshot: &str) -> String {
    format!("{} {}{}", TURN_SEPARATOR, utterance, history_snapshot)
}

/// Derive the cache key for one turn. Pure and deterministic.
pub fn derive(utterance: &str, history_snapshot: &str, db_id: &str) -> CacheKey {
    let mut key = prefixed_input(utterance, history_snapshot);
    key.push_str(db_id);
    CacheKey(key)
}

/// Drop the leading `"<s> "` and turn the remaining separators into `[CLS]`.
pub fn classifier_input(prefixed: &str) -> String {
    let leading = format!("{} ", TURN_SEPARATOR);
    let stripped = prefixed.strip_prefix(leading.as_str()).unwrap_or(prefixed);
    stripped.replace(TURN_SEPARATOR, CLASSIFICATION_MARKER)
}
