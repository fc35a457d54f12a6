//! Sliding window log algorithm.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Denial, RateLimitAlgorithm, Verdict};
use crate::config::SlidingWindowConfig;
use crate::key::derive_key;
use crate::request::RateRequest;
use crate::storage::StorageDriver;
use crate::token::Token;

/// Keeps a log of request timestamps per key and counts the ones inside the
/// window ending at each request's own "now". Purely request-driven: there
/// is no timer, and correctness depends entirely on pruning outdated entries
/// at check time, so each check costs O(entries within the last window).
///
/// Unlike the other algorithms, a request the configured field cannot
/// classify is rejected outright (401) rather than admitted.
pub struct SlidingWindowLog {
    config: SlidingWindowConfig,
    storage: Arc<dyn StorageDriver>,
}

impl SlidingWindowLog {
    /// Create the algorithm. No background task is started.
    pub fn new(config: SlidingWindowConfig, storage: Arc<dyn StorageDriver>) -> Self {
        Self { config, storage }
    }
}

#[async_trait]
impl RateLimitAlgorithm for SlidingWindowLog {
    async fn check_request(&self, request: &RateRequest) -> Verdict {
        let key = match derive_key(&self.config.applied_field, &self.config.scope, request) {
            Ok(key) => key,
            Err(error) => {
                debug!(error = %error, "request not classifiable, rejecting");
                return Verdict::Deny(Denial::unauthorized());
            }
        };

        let mut list = match self.storage.get(&key).await {
            Ok(list) => list.unwrap_or_default(),
            Err(error) => {
                warn!(key = %key, error = %error, "token list read failed, admitting");
                return Verdict::Allow;
            }
        };

        // Slide the window: drop entries older than the window relative to
        // now, then log this request.
        list.remove_older_than(self.config.window.duration());
        list.push(Token::new());
        let in_window = list.count();

        if let Err(error) = self.storage.set(&key, &list).await {
            warn!(key = %key, error = %error, "token list write failed, admitting");
            return Verdict::Allow;
        }

        if in_window > self.config.requests_per_window {
            debug!(
                key = %key,
                in_window = in_window,
                limit = self.config.requests_per_window,
                "sliding window limit exceeded"
            );
            Verdict::Deny(Denial::too_many_requests())
        } else {
            Verdict::Allow
        }
    }

    /// Nothing to reconcile; pruning happens inside every check.
    async fn reconcile(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Field, Scope, TimeWindow};
    use crate::storage::MemoryDriver;
    use std::time::Duration;

    fn test_config(limit: usize, window: TimeWindow) -> SlidingWindowConfig {
        SlidingWindowConfig {
            applied_field: Field::Header("X-ApiKey".to_string()),
            scope: Scope::Endpoint,
            requests_per_window: limit,
            window,
        }
    }

    fn test_request() -> RateRequest {
        RateRequest::new("/v1/things").with_header("X-ApiKey", "key-a")
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_denies() {
        let limiter = SlidingWindowLog::new(
            test_config(10, TimeWindow::Minutes(2)),
            Arc::new(MemoryDriver::new()),
        );
        let request = test_request();

        for i in 1..=10 {
            let verdict = limiter.check_request(&request).await;
            assert!(verdict.is_allowed(), "request {} should be allowed", i);
        }

        assert!(!limiter.check_request(&request).await.is_allowed());
    }

    #[tokio::test]
    async fn test_unclassifiable_request_is_rejected() {
        let limiter = SlidingWindowLog::new(
            test_config(10, TimeWindow::Minutes(2)),
            Arc::new(MemoryDriver::new()),
        );

        // No X-ApiKey header: this algorithm fails closed.
        let request = RateRequest::new("/v1/things");
        let verdict = limiter.check_request(&request).await;
        assert_eq!(verdict, Verdict::Deny(Denial::unauthorized()));
    }

    #[tokio::test]
    async fn test_window_slides_with_each_request() {
        let limiter = SlidingWindowLog::new(
            test_config(10, TimeWindow::Seconds(1)),
            Arc::new(MemoryDriver::new()),
        );
        let request = test_request();

        // Fill the window.
        for _ in 0..10 {
            assert!(limiter.check_request(&request).await.is_allowed());
        }

        // Half a window later the first batch still counts.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!limiter.check_request(&request).await.is_allowed());

        // Once the first batch ages past the window, capacity returns.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(limiter.check_request(&request).await.is_allowed());
    }

    #[tokio::test]
    async fn test_denied_requests_still_count_in_the_log() {
        let limiter = SlidingWindowLog::new(
            test_config(1, TimeWindow::Seconds(1)),
            Arc::new(MemoryDriver::new()),
        );
        let request = test_request();

        assert!(limiter.check_request(&request).await.is_allowed());
        assert!(!limiter.check_request(&request).await.is_allowed());
        assert!(!limiter.check_request(&request).await.is_allowed());
    }

    #[tokio::test]
    async fn test_reconcile_is_a_noop() {
        let storage = Arc::new(MemoryDriver::new());
        let limiter =
            SlidingWindowLog::new(test_config(10, TimeWindow::Minutes(2)), storage.clone());

        limiter.check_request(&test_request()).await;
        let before = storage.key_count();
        limiter.reconcile().await;
        assert_eq!(storage.key_count(), before);
    }
}
