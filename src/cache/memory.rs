use super::{CacheNamespace, CacheStore};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-process store. Entries never expire; only `clear` removes them.
#[derive(Default)]
pub struct MemoryCacheStore {
    text2sql: DashMap<String, Vec<u8>>,
    analysis: DashMap<String, Vec<u8>>,
    user_intent: DashMap<String, Vec<u8>>,
    table2text: DashMap<String, Vec<u8>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self, namespace: CacheNamespace) -> &DashMap<String, Vec<u8>> {
        match namespace {
            CacheNamespace::Text2Sql => &self.text2sql,
            CacheNamespace::Analysis => &self.analysis,
            CacheNamespace::UserIntent => &self.user_intent,
            CacheNamespace::Table2Text => &self.table2text,
        }
    }

    pub fn len(&self, namespace: CacheNamespace) -> usize {
        self.namespace(namespace).len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn exists(&self, namespace: CacheNamespace, key: &str) -> Result<bool> {
        Ok(self.namespace(namespace).contains_key(key))
    }

    async fn get(&self, namespace: CacheNamespace, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.namespace(namespace).get(key).map(|entry| entry.value().clone()))
    }

    async fn put(&self, namespace: CacheNamespace, key: &str, value: Vec<u8>) -> Result<()> {
        self.namespace(namespace).insert(key.to_string(), value);
        Ok(())
    }

    async fn clear(&self, namespace: CacheNamespace) -> Result<()> {
        self.namespace(namespace).clear();
        Ok(())
    }
}
