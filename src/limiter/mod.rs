//! Rate limiting algorithms and their shared contract.
//!
//! Each algorithm instance owns its in-memory bookkeeping (the set of keys
//! seen since the last reconciliation) behind a mutex that is never held
//! across storage awaits: concurrent checks serialize their bookkeeping but
//! their storage I/O may overlap. On list-based drivers the read-modify-write
//! sequence against storage is therefore not atomic end-to-end; a
//! reconciliation tick and an in-flight check can interleave around the
//! storage round trip. This is a known consistency gap, accepted instead of
//! a global lock that would serialize all keys. Counter-based drivers are
//! exempt: their increment/decrement primitives are atomic on their own.

mod fixed_window;
mod leaking_bucket;
mod sliding_window;
mod token_bucket;

pub use fixed_window::FixedWindowCounter;
pub use leaking_bucket::LeakingBucket;
pub use sliding_window::SlidingWindowLog;
pub use token_bucket::TokenBucket;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::trace;

use crate::request::RateRequest;

/// Default reason attached to limit-exceeded denials.
const LIMIT_REACHED_REASON: &str = "request rate limit exceeded for this key";
/// Default reason attached to unclassifiable-request denials.
const UNCLASSIFIABLE_REASON: &str = "expected classification field not present in the request";

/// The outcome of checking one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Admit the request.
    Allow,
    /// Reject the request with the given denial.
    Deny(Denial),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

/// A rejection, carrying the HTTP status the surrounding gate should map it
/// to and a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Suggested HTTP status code
    pub status: u16,
    /// Reason for the denial
    pub reason: String,
}

impl Denial {
    /// Denial for a key that has exceeded its limit.
    pub fn too_many_requests() -> Self {
        Self {
            status: 429,
            reason: LIMIT_REACHED_REASON.to_string(),
        }
    }

    /// Denial for a request the sliding window log could not classify.
    pub fn unauthorized() -> Self {
        Self {
            status: 401,
            reason: UNCLASSIFIABLE_REASON.to_string(),
        }
    }

    /// Whether this denial means the key exceeded its limit, as opposed to
    /// any other rejection.
    pub fn is_rate_limit(&self) -> bool {
        self.status == 429
    }
}

/// Common contract for the four rate limiting algorithms.
#[async_trait]
pub trait RateLimitAlgorithm: Send + Sync {
    /// Classify the request, consult storage, and return a verdict.
    ///
    /// Never fails: storage errors degrade to [`Verdict::Allow`] so a store
    /// outage cannot become a global denial of service.
    async fn check_request(&self, request: &RateRequest) -> Verdict;

    /// Run one reconciliation pass: reset, leak, or refill stored state for
    /// every tracked key. The sliding window log has nothing to reconcile.
    async fn reconcile(&self);
}

/// Cancellable periodic task driving an algorithm's reconciliation.
///
/// The timer loop is aborted when the owning algorithm is dropped; per-key
/// reconciliation tasks already spawned keep running to completion on their
/// own.
pub(crate) struct WindowTimer {
    handle: JoinHandle<()>,
}

impl WindowTimer {
    /// Spawn a timer invoking `action` every `period`.
    pub(crate) fn spawn<F, Fut>(period: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the first
            // reconciliation happens one full period after startup.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                trace!("window timer tick");
                action().await;
            }
        });

        Self { handle }
    }
}

impl Drop for WindowTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
