//! Memoizer
//!
//! Typed layer over a [`CacheStore`]. Payloads are JSON. When the store is
//! unreachable the memoizer bypasses it: lookups become misses and writes are
//! dropped, so requests are served correctly but without memoization.

use super::{CacheNamespace, CacheStore};
use crate::error::{OrchestratorError, Result};
use crate::key::CacheKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct NamespaceCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
}

impl NamespaceCounters {
    fn snapshot(&self) -> NamespaceStats {
        NamespaceStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    pub hits: u64,
    pub misses: u64,
    /// Operations skipped because the store was unavailable
    pub bypasses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub text2sql: NamespaceStats,
    pub analysis: NamespaceStats,
    pub user_intent: NamespaceStats,
    pub table2text: NamespaceStats,
}

pub struct Memoizer {
    store: Arc<dyn CacheStore>,
    counters: [NamespaceCounters; 4],
}

impl Memoizer {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            counters: Default::default(),
        }
    }

    fn counters(&self, namespace: CacheNamespace) -> &NamespaceCounters {
        let index = match namespace {
            CacheNamespace::Text2Sql => 0,
            CacheNamespace::Analysis => 1,
            CacheNamespace::UserIntent => 2,
            CacheNamespace::Table2Text => 3,
        };
        &self.counters[index]
    }

    /// Fetch and decode a cached value. `Ok(None)` on miss or bypass.
    pub async fn lookup<T: DeserializeOwned>(
        &self,
        namespace: CacheNamespace,
        key: &CacheKey,
    ) -> Result<Option<T>> {
        let counters = self.counters(namespace);

        match self.store.get(namespace, key.as_str()).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache hit in {}", namespace);
                    Ok(Some(value))
                }
                Err(e) => {
                    // The entry is recomputed and overwritten by the caller.
                    warn!("Discarding undecodable entry in {}: {}", namespace, e);
                    counters.misses.fetch_add(1, Ordering::Relaxed);
                    Ok(None)
                }
            },
            Ok(None) => {
                counters.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(OrchestratorError::CacheUnavailable(reason)) => {
                error!("Cache unavailable, bypassing {} lookup: {}", namespace, reason);
                counters.bypasses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Encode and store a value under `key`.
    pub async fn store<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        key: &CacheKey,
        value: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;

        match self.store.put(namespace, key.as_str(), bytes).await {
            Ok(()) => Ok(()),
            Err(OrchestratorError::CacheUnavailable(reason)) => {
                error!("Cache unavailable, result for {} not stored: {}", namespace, reason);
                self.counters(namespace).bypasses.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Clear every namespace. Used at startup when flushing is configured.
    pub async fn clear_all(&self) -> Result<()> {
        for namespace in CacheNamespace::ALL {
            self.store.clear(namespace).await?;
        }
        info!("Flushed all cache namespaces");
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            text2sql: self.counters(CacheNamespace::Text2Sql).snapshot(),
            analysis: self.counters(CacheNamespace::Analysis).snapshot(),
            user_intent: self.counters(CacheNamespace::UserIntent).snapshot(),
            table2text: self.counters(CacheNamespace::Table2Text).snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::key;
    use async_trait::async_trait;

    struct UnreachableStore;

    #[async_trait]
    impl CacheStore for UnreachableStore {
        async fn exists(&self, _: CacheNamespace, _: &str) -> Result<bool> {
            Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
        }
        async fn get(&self, _: CacheNamespace, _: &str) -> Result<Option<Vec<u8>>> {
            Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
        }
        async fn put(&self, _: CacheNamespace, _: &str, _: Vec<u8>) -> Result<()> {
            Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
        }
        async fn clear(&self, _: CacheNamespace) -> Result<()> {
            Err(OrchestratorError::CacheUnavailable("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_roundtrip_counts_hit_and_miss() {
        let memo = Memoizer::new(Arc::new(MemoryCacheStore::new()));
        let key = key::derive("How many singers", "", "concert_singer");

        let missing: Option<String> = memo.lookup(CacheNamespace::UserIntent, &key).await.unwrap();
        assert!(missing.is_none());

        memo.store(CacheNamespace::UserIntent, &key, &"query".to_string()).await.unwrap();
        let found: Option<String> = memo.lookup(CacheNamespace::UserIntent, &key).await.unwrap();
        assert_eq!(found.as_deref(), Some("query"));

        let stats = memo.stats();
        assert_eq!(stats.user_intent.hits, 1);
        assert_eq!(stats.user_intent.misses, 1);
        assert_eq!(stats.text2sql, NamespaceStats::default());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_bypassed() {
        let memo = Memoizer::new(Arc::new(UnreachableStore));
        let key = key::derive("q", "", "db");

        let found: Option<String> = memo.lookup(CacheNamespace::Text2Sql, &key).await.unwrap();
        assert!(found.is_none());
        memo.store(CacheNamespace::Text2Sql, &key, &"x").await.unwrap();

        assert_eq!(memo.stats().text2sql.bypasses, 2);
    }

    #[tokio::test]
    async fn test_clear_all_propagates_unavailable() {
        let memo = Memoizer::new(Arc::new(UnreachableStore));
        assert!(matches!(
            memo.clear_all().await,
            Err(OrchestratorError::CacheUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(MemoryCacheStore::new());
        let key = key::derive("q", "", "db");
        store
            .put(CacheNamespace::Analysis, key.as_str(), b"not json".to_vec())
            .await
            .unwrap();

        let memo = Memoizer::new(store);
        let found: Option<u32> = memo.lookup(CacheNamespace::Analysis, &key).await.unwrap();
        assert!(found.is_none());
    }
}
