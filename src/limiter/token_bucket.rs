//! Token bucket algorithm.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{Denial, RateLimitAlgorithm, Verdict, WindowTimer};
use crate::config::TokenBucketConfig;
use crate::key::derive_key;
use crate::request::RateRequest;
use crate::storage::StorageDriver;
use crate::token::{Token, TokenList};

/// Each key owns a bucket that starts at full capacity; every admitted
/// request consumes one token, and a timer adds tokens back at the refill
/// rate.
///
/// On list-based drivers the bucket is a token list; on atomic-counter
/// drivers it is a single counter, consumed with decrement-then-check: the
/// decrement itself is atomic, at the cost of tolerating a transient
/// one-request overdraft below zero. Initializing an absent counter is an
/// exists-then-increment pair, so two instances first sighting the same key
/// concurrently can double-initialize it; the store contract offers no
/// set-if-absent to close that gap.
///
/// Requests the configured field cannot classify are admitted without
/// consuming, as are requests the storage driver fails on.
pub struct TokenBucket {
    inner: Arc<Inner>,
    _timer: WindowTimer,
}

struct Inner {
    config: TokenBucketConfig,
    storage: Arc<dyn StorageDriver>,
    /// Keys with buckets to refill; retained across ticks
    keys: Mutex<HashSet<String>>,
}

impl TokenBucket {
    /// Create the algorithm and start its refill timer.
    pub fn new(config: TokenBucketConfig, storage: Arc<dyn StorageDriver>) -> Self {
        let period = config.refill_interval.duration();
        let inner = Arc::new(Inner {
            config,
            storage,
            keys: Mutex::new(HashSet::new()),
        });

        let timer_inner = Arc::clone(&inner);
        let timer = WindowTimer::spawn(period, move || {
            let inner = Arc::clone(&timer_inner);
            async move { inner.refill().await }
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
            return match self.consume_counter(&key).await {
                Ok(verdict) => verdict,
                Err(error) => {
                    warn!(key = %key, error = %error, "counter consume failed, admitting");
                    Verdict::Allow
                }
            };
        }

        let list = match self.storage.get(&key).await {
            Ok(Some(list)) => Some(list),
            Ok(None) => None,
            Err(error) => {
                warn!(key = %key, error = %error, "token list read failed, admitting");
                return Verdict::Allow;
            }
        };

        // First sight of a key starts from a full bucket.
        let mut list = list.unwrap_or_else(|| TokenList::filled(self.config.bucket_size));

        if list.is_empty() {
            debug!(key = %key, "bucket exhausted");
            return Verdict::Deny(Denial::too_many_requests());
        }

        list.pop_oldest();

        if let Err(error) = self.storage.set(&key, &list).await {
            warn!(key = %key, error = %error, "token list write failed, admitting");
        }
        Verdict::Allow
    }

    async fn consume_counter(&self, key: &str) -> crate::error::Result<Verdict> {
        if !self.storage.exists(key).await? {
            self.storage
                .increment(key, self.config.bucket_size as i64)
                .await?;
        }

        let remaining = self.storage.decrement(key, 1).await?;

        if remaining < 0 {
            debug!(key = %key, remaining = remaining, "bucket exhausted");
            Ok(Verdict::Deny(Denial::too_many_requests()))
        } else {
            Ok(Verdict::Allow)
        }
    }

    /// Refill each tracked bucket.
    ///
    /// A negative level (counter overdraft) is only brought back up to
    /// exactly zero, a level at or above capacity is clamped down to
    /// capacity, and anything in between gains `refill_rate` tokens.
    async fn refill(&self) {
        let keys: Vec<String> = self.keys.lock().iter().cloned().collect();

        trace!(keys = keys.len(), "refill tick");

        let refills: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let storage = Arc::clone(&self.storage);
                let capacity = self.config.bucket_size as i64;
                let refill_rate = self.config.refill_rate as i64;
                tokio::spawn(async move {
                    if let Err(error) = refill_key(&storage, &key, capacity, refill_rate).await {
                        warn!(key = %key, error = %error, "failed to refill bucket");
                    }
                })
            })
            .collect();

        futures::future::join_all(refills).await;
    }
}

fn refill_delta(level: i64, capacity: i64, refill_rate: i64) -> i64 {
    if level < 0 {
        // Floor clamp: back to exactly zero, never straight to capacity.
        -level
    } else if level >= capacity {
        capacity - level
    } else {
        refill_rate
    }
}

async fn refill_key(
    storage: &Arc<dyn StorageDriver>,
    key: &str,
    capacity: i64,
    refill_rate: i64,
) -> crate::error::Result<()> {
    if storage.supports_atomic_counters() {
        let level = storage.increment(key, 0).await?;
        let delta = refill_delta(level, capacity, refill_rate);
        if delta > 0 {
            storage.increment(key, delta).await?;
        } else if delta < 0 {
            storage.decrement(key, -delta).await?;
        }
        return Ok(());
    }

    if let Some(mut list) = storage.get(key).await? {
        let delta = refill_delta(list.count() as i64, capacity, refill_rate);
        if delta > 0 {
            list.append_many((0..delta).map(|_| Token::new()).collect());
        } else if delta < 0 {
            list.remove_count((-delta) as usize);
        } else {
            return Ok(());
        }
        storage.set(key, &list).await?;
    }
    Ok(())
}

#[async_trait]
impl RateLimitAlgorithm for TokenBucket {
    async fn check_request(&self, request: &RateRequest) -> Verdict {
        self.inner.check_request(request).await
    }

    async fn reconcile(&self) {
        self.inner.refill().await;
    }
}
