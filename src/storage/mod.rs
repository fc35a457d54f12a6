//! Storage driver contract and implementations.
//!
//! All per-key counting state lives behind [`StorageDriver`], the only
//! resource shared across algorithm instances and, for remote drivers,
//! across process boundaries. The engine never manages locks, transactions,
//! or TTLs inside the store itself.

mod memory;
mod redis;

pub use memory::MemoryDriver;
pub use redis::RedisDriver;

use async_trait::async_trait;

use crate::error::Result;
use crate::token::TokenList;

/// Key-value capability set consumed by the rate limiting algorithms.
///
/// Drivers expose two families of state for a key: an opaque token list
/// (`get`/`set`) and an integer counter (`increment`/`decrement`). A driver
/// that reports [`supports_atomic_counters`](Self::supports_atomic_counters)
/// guarantees that its increment/decrement are atomic independent of caller
/// serialization; counter-capable algorithms will then prefer counters over
/// token lists.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Fetch the token list stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<TokenList>>;

    /// Store `value` under `key`, replacing any previous list.
    async fn set(&self, key: &str, value: &TokenList) -> Result<()>;

    /// Delete all state stored under `key`.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Whether any state exists under `key`.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically add `by` to the counter under `key`, creating it at zero
    /// if absent. Returns the new value.
    async fn increment(&self, key: &str, by: i64) -> Result<i64>;

    /// Atomically subtract `by` from the counter under `key`, creating it at
    /// zero if absent. Returns the new value.
    async fn decrement(&self, key: &str, by: i64) -> Result<i64>;

    /// Whether increment/decrement are atomic across instances.
    fn supports_atomic_counters(&self) -> bool {
        false
    }
}

/// Memory-backed driver that advertises atomic counters, standing in for a
/// shared counter store in tests.
#[cfg(test)]
pub(crate) struct CounterStubDriver(pub(crate) MemoryDriver);

#[cfg(test)]
#[async_trait]
impl StorageDriver for CounterStubDriver {
    async fn get(&self, key: &str) -> Result<Option<TokenList>> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: &TokenList) -> Result<()> {
        self.0.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.0.remove(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.0.exists(key).await
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.0.increment(key, by).await
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        self.0.decrement(key, by).await
    }

    fn supports_atomic_counters(&self) -> bool {
        true
    }
}
