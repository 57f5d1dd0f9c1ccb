//! Result cache
//!
//! Namespace-partitioned key/value memoization over an external store. Stores
//! only move bytes; serialization lives in [`Memoizer`].
//!
//! Backends:
//! - [`MemoryCacheStore`]: process-local, one concurrent map per namespace
//! - [`SqliteCacheStore`]: persistent, one table with a namespace column

pub mod memo;
pub mod memory;
pub mod sqlite;

pub use memo::{CacheStats, Memoizer, NamespaceStats};
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent key spaces; a hit in one says nothing about another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    Text2Sql,
    Analysis,
    UserIntent,
    Table2Text,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 4] = [
        CacheNamespace::Text2Sql,
        CacheNamespace::Analysis,
        CacheNamespace::UserIntent,
        CacheNamespace::Table2Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::Text2Sql => "text2sql",
            CacheNamespace::Analysis => "analysis",
            CacheNamespace::UserIntent => "user_intent",
            CacheNamespace::Table2Text => "table2text",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte store behind the result cache.
///
/// Connection failures must surface as `OrchestratorError::CacheUnavailable`
/// so callers can bypass caching instead of failing the request.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn exists(&self, namespace: CacheNamespace, key: &str) -> Result<bool>;

    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Last write wins.
    async fn put(&self, namespace: CacheNamespace, key: &str, value: Vec<u8>) -> Result<()>;

    async fn clear(&self, namespace: CacheNamespace) -> Result<()>;
}
