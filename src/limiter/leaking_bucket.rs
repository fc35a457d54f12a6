//! Leaking bucket algorithm.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{Denial, RateLimitAlgorithm, Verdict, WindowTimer};
use crate::config::LeakingBucketConfig;
use crate::key::derive_key;
use crate::request::RateRequest;
use crate::storage::StorageDriver;
use crate::token::Token;

/// Each arrival adds one token to the key's bucket; arrivals that would
/// overfill the bucket are rejected. A timer drains tokens at a fixed rate
/// per tick, independent of request volume.
///
/// Requests the configured field cannot classify are admitted without
/// counting, as are requests the storage driver fails on.
pub struct LeakingBucket {
    inner: Arc<Inner>,
    _timer: WindowTimer,
}

struct Inner {
    config: LeakingBucketConfig,
    storage: Arc<dyn StorageDriver>,
    /// Keys with buckets to drain; retained across ticks
    keys: Mutex<HashSet<String>>,
}

impl LeakingBucket {
    /// Create the algorithm and start its leak timer.
    pub fn new(config: LeakingBucketConfig, storage: Arc<dyn StorageDriver>) -> Self {
        let period = config.leak_interval.duration();
        let inner = Arc::new(Inner {
            config,
            storage,
            keys: Mutex::new(HashSet::new()),
        });

        let timer_inner = Arc::clone(&inner);
        let timer = WindowTimer::spawn(period, move || {
            let inner = Arc::clone(&timer_inner);
            async move { inner.leak().await }
        });

        Self {
            inner,
            _timer: timer,
        }
    }
}

impl Inner {
    async fn check_request(&self, request: &RateRequest) -> Verdict {
        let key = match derive_key(&self.config.applied_field, &self.config.scope, request) {
            Ok(key) => key,
            Err(error) => {
                trace!(error = %error, "request not classifiable, admitting");
                return Verdict::Allow;
            }
        };

        self.keys.lock().insert(key.clone());

        if self.storage.supports_atomic_counters() {
            let fill = match self.storage.increment(&key, 1).await {
                Ok(value) => value,
                Err(error) => {
                    warn!(key = %key, error = %error, "counter increment failed, admitting");
                    return Verdict::Allow;
                }
            };

            if fill > self.config.bucket_size as i64 {
                debug!(key = %key, fill = fill, capacity = self.config.bucket_size, "bucket full");
                return Verdict::Deny(Denial::too_many_requests());
            }
            return Verdict::Allow;
        }

        let mut list = match self.storage.get(&key).await {
            Ok(list) => list.unwrap_or_default(),
            Err(error) => {
                warn!(key = %key, error = %error, "token list read failed, admitting");
                return Verdict::Allow;
            }
        };

        list.push(Token::new());

        if list.count() > self.config.bucket_size {
            debug!(
                key = %key,
                fill = list.count(),
                capacity = self.config.bucket_size,
                "bucket full"
            );
            // The overfull arrival is not persisted.
            return Verdict::Deny(Denial::too_many_requests());
        }

        if let Err(error) = self.storage.set(&key, &list).await {
            warn!(key = %key, error = %error, "token list write failed, admitting");
        }
        Verdict::Allow
    }

    /// Drain each tracked bucket down to `leak_rate` tokens.
    ///
    /// Removal is `count - leak_rate` oldest tokens per key; removing the
    /// whole bucket in one tick is treated as a no-op by the over-deletion
    /// guard on the token list, and the counter path mirrors that guard.
    async fn leak(&self) {
        let keys: Vec<String> = self.keys.lock().iter().cloned().collect();

        trace!(keys = keys.len(), "leak tick");

        let drains: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let storage = Arc::clone(&self.storage);
                let leak_rate = self.config.leak_rate;
                tokio::spawn(async move {
                    if let Err(error) = leak_key(&storage, &key, leak_rate).await {
                        warn!(key = %key, error = %error, "failed to drain bucket");
                    }
                })
            })
            .collect();

        futures::future::join_all(drains).await;
    }
}

async fn leak_key(
    storage: &Arc<dyn StorageDriver>,
    key: &str,
    leak_rate: usize,
) -> crate::error::Result<()> {
    if storage.supports_atomic_counters() {
        let fill = storage.increment(key, 0).await?;
        let to_remove = (fill - leak_rate as i64).max(0);
        if to_remove > 0 && to_remove < fill {
            storage.decrement(key, to_remove).await?;
        }
        return Ok(());
    }

    if let Some(mut list) = storage.get(key).await? {
        let to_remove = list.count().saturating_sub(leak_rate);
        if to_remove > 0 {
            list.remove_count(to_remove);
            storage.set(key, &list).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl RateLimitAlgorithm for LeakingBucket {
    async fn check_request(&self, request: &RateRequest) -> Verdict {
        self.inner.check_request(request).await
    }

    async fn reconcile(&self) {
        self.inner.leak().await;
    }
}
