//! Remote atomic-counter storage driver backed by Redis.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use super::StorageDriver;
use crate::error::Result;
use crate::token::TokenList;

/// Driver for a shared Redis instance.
///
/// Token lists are stored as JSON strings; counters use `INCRBY`/`DECRBY`,
/// which Redis applies atomically regardless of how many engine instances
/// share the store. No expiry is set on any key; lifecycle is entirely
/// driven by the algorithms' reconciliation.
#[derive(Clone)]
pub struct RedisDriver {
    conn: MultiplexedConnection,
}

impl RedisDriver {
    /// Connect to the Redis instance at `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to counter store");

        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        debug!("Counter store connection established");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StorageDriver for RedisDriver {
    async fn get(&self, key: &str) -> Result<Option<TokenList>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &TokenList) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(value)?;
        let _: () = conn.set(key, json).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, by).await?)
    }

    async fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        Ok(conn.decr(key, by).await?)
    }

    fn supports_atomic_counters(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_URL: &str = "redis://127.0.0.1/";

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn test_list_round_trip() {
        let driver = RedisDriver::connect(TEST_URL).await.unwrap();

        driver.remove("tollgate-test:list").await.unwrap();
        driver
            .set("tollgate-test:list", &TokenList::filled(4))
            .await
            .unwrap();

        let list = driver.get("tollgate-test:list").await.unwrap().unwrap();
        assert_eq!(list.count(), 4);

        driver.remove("tollgate-test:list").await.unwrap();
        assert!(!driver.exists("tollgate-test:list").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn test_counter_round_trip() {
        let driver = RedisDriver::connect(TEST_URL).await.unwrap();

        driver.remove("tollgate-test:counter").await.unwrap();
        assert_eq!(driver.increment("tollgate-test:counter", 10).await.unwrap(), 10);
        assert_eq!(driver.decrement("tollgate-test:counter", 11).await.unwrap(), -1);

        driver.remove("tollgate-test:counter").await.unwrap();
    }
}
