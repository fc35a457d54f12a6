//! In-process storage driver.

use async_trait::async_trait;
use dashmap::DashMap;

use super::StorageDriver;
use crate::error::Result;
use crate::token::TokenList;

/// Map-backed driver for single-instance deployments.
///
/// Counters are only atomic within this process; the driver reports no
/// cross-instance atomicity, so algorithms run in their token-list mode
/// against it.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    lists: DashMap<String, TokenList>,
    counters: DashMap<String, i64>,
}

impl MemoryDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with any stored state. Primarily useful for tests.
    pub fn key_count(&self) -> usize {
        self.lists.len() + self.counters.len()
    }
}

#[async_trait]
impl StorageDriver for MemoryDriver {
    async fn get(&self, key: &str) -> Result<Option<TokenList>> {
        Ok(self.lists.get(key).map(|entry| entry.clone()))
    }

    async fn set(&self, key: &str, value: &TokenList) -> Result<()> {
        self.lists.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lists.remove(key);
        self.counters.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.lists.contains_key(key) || self.counters.contains_key(key))
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry += by;
        Ok(*entry)
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        let mut entry = self.counters.entry(key.to_string()).or_insert(0);
        *entry -= by;
        Ok(*entry)
    }
}
