//! Fixed window counter algorithm.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::{Denial, RateLimitAlgorithm, Verdict, WindowTimer};
use crate::config::FixedWindowConfig;
use crate::key::derive_key;
use crate::request::RateRequest;
use crate::storage::StorageDriver;
use crate::token::Token;

/// Counts requests per key inside wall-clock windows of fixed duration.
///
/// Every window period a timer wipes the stored record of each key seen in
/// that window. Because the reset is a blanket tick rather than a per-key
/// sliding start, a key first seen just before a tick gets an effectively
/// shorter window; that boundary burst is intrinsic to the algorithm.
///
/// Requests the configured field cannot classify are admitted without
/// counting, as are requests the storage driver fails on.
pub struct FixedWindowCounter {
    inner: Arc<Inner>,
    _timer: WindowTimer,
}

struct Inner {
    config: FixedWindowConfig,
    storage: Arc<dyn StorageDriver>,
    /// Keys touched during the current window
    keys: Mutex<HashSet<String>>,
}

impl FixedWindowCounter {
    /// Create the algorithm and start its reset timer.
    pub fn new(config: FixedWindowConfig, storage: Arc<dyn StorageDriver>) -> Self {
        let period = config.window.duration();
        let inner = Arc::new(Inner {
            config,
            storage,
            keys: Mutex::new(HashSet::new()),
        });

        let timer_inner = Arc::clone(&inner);
        let timer = WindowTimer::spawn(period, move || {
            let inner = Arc::clone(&timer_inner);
            async move { inner.reset_window().await }
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

        let count = if self.storage.supports_atomic_counters() {
            match self.storage.increment(&key, 1).await {
                Ok(value) => value,
                Err(error) => {
                    warn!(key = %key, error = %error, "counter increment failed, admitting");
                    return Verdict::Allow;
                }
            }
        } else {
            let mut list = match self.storage.get(&key).await {
                Ok(list) => list.unwrap_or_default(),
                Err(error) => {
                    warn!(key = %key, error = %error, "token list read failed, admitting");
                    return Verdict::Allow;
                }
            };
            list.push(Token::new());
            let count = list.count() as i64;

            if let Err(error) = self.storage.set(&key, &list).await {
                warn!(key = %key, error = %error, "token list write failed, admitting");
                return Verdict::Allow;
            }
            count
        };

        if count > self.config.requests_per_window as i64 {
            debug!(
                key = %key,
                count = count,
                limit = self.config.requests_per_window,
                "window limit exceeded"
            );
            Verdict::Deny(Denial::too_many_requests())
        } else {
            Verdict::Allow
        }
    }

    /// Delete every tracked key's record and start a fresh window.
    ///
    /// Deletion failures are logged per key, never retried, and never stop
    /// the other deletions.
    async fn reset_window(&self) {
        let keys: Vec<String> = {
            let mut keys = self.keys.lock();
            keys.drain().collect()
        };

        trace!(keys = keys.len(), "resetting window");

        let deletions: Vec<_> = keys
            .into_iter()
            .map(|key| {
                let storage = Arc::clone(&self.storage);
                tokio::spawn(async move {
                    if let Err(error) = storage.remove(&key).await {
                        warn!(key = %key, error = %error, "failed to clear window record");
                    }
                })
            })
            .collect();

        futures::future::join_all(deletions).await;
    }
}

#[async_trait]
impl RateLimitAlgorithm for FixedWindowCounter {
    async fn check_request(&self, request: &RateRequest) -> Verdict {
        self.inner.check_request(request).await
    }

    async fn reconcile(&self) {
        self.inner.reset_window().await;
    }
}
