//! Admission gate: the middleware-facing boundary of the engine.
//!
//! The gate runs one algorithm check per request and converts the verdict
//! into an outcome the surrounding middleware can map onto its transport.
//! Lifecycle hooks let callers observe checks and decorate denials with
//! extra response headers or an overriding reason; the gate itself never
//! constructs transport-level responses.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::limiter::{Denial, RateLimitAlgorithm, Verdict};
use crate::request::RateRequest;

/// Mutable metadata a denial hook can attach to the outcome.
#[derive(Debug, Default)]
pub struct DenialMetadata {
    /// Extra response headers to send with the denial
    pub headers: HashMap<String, String>,
    /// Overrides the algorithm's reason string when set
    pub reason: Option<String>,
}

/// Hook invoked around a check with the request only.
pub type CheckHook = Box<dyn Fn(&RateRequest) + Send + Sync>;
/// Hook invoked when a request is denied for exceeding its limit.
pub type DeniedHook = Box<dyn Fn(&RateRequest, &mut DenialMetadata) + Send + Sync>;
/// Hook invoked when a check fails for any other reason, with the
/// underlying denial.
pub type ErroredHook = Box<dyn Fn(&RateRequest, &Denial, &mut DenialMetadata) + Send + Sync>;

/// The gate's answer for one request.
#[derive(Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// Continue the request pipeline.
    Allowed,
    /// Reject with the suggested status, reason, and extra headers.
    Denied {
        status: u16,
        reason: Option<String>,
        headers: HashMap<String, String>,
    },
}

impl GateOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateOutcome::Allowed)
    }
}

/// Calls an algorithm once per request and exposes lifecycle hooks.
pub struct AdmissionGate {
    algorithm: Arc<dyn RateLimitAlgorithm>,
    will_check: Option<CheckHook>,
    did_allow: Option<CheckHook>,
    did_deny: Option<DeniedHook>,
    did_error: Option<ErroredHook>,
}

impl AdmissionGate {
    /// Create a gate around the given algorithm.
    pub fn new(algorithm: Arc<dyn RateLimitAlgorithm>) -> Self {
        Self {
            algorithm,
            will_check: None,
            did_allow: None,
            did_deny: None,
            did_error: None,
        }
    }

    /// Hook invoked before every check.
    pub fn on_will_check(mut self, hook: impl Fn(&RateRequest) + Send + Sync + 'static) -> Self {
        self.will_check = Some(Box::new(hook));
        self
    }

    /// Hook invoked after a check that allowed the request.
    pub fn on_did_allow(mut self, hook: impl Fn(&RateRequest) + Send + Sync + 'static) -> Self {
        self.did_allow = Some(Box::new(hook));
        self
    }

    /// Hook invoked after a limit-exceeded denial; may attach headers and a
    /// reason to the outcome.
    pub fn on_did_deny(
        mut self,
        hook: impl Fn(&RateRequest, &mut DenialMetadata) + Send + Sync + 'static,
    ) -> Self {
        self.did_deny = Some(Box::new(hook));
        self
    }

    /// Hook invoked after any other check failure, with the underlying
    /// denial; may attach headers and a reason to the outcome.
    pub fn on_did_error(
        mut self,
        hook: impl Fn(&RateRequest, &Denial, &mut DenialMetadata) + Send + Sync + 'static,
    ) -> Self {
        self.did_error = Some(Box::new(hook));
        self
    }

    /// Check one request and convert the verdict into a gate outcome.
    pub async fn admit(&self, request: &RateRequest) -> GateOutcome {
        if let Some(hook) = &self.will_check {
            hook(request);
        }

        match self.algorithm.check_request(request).await {
            Verdict::Allow => {
                trace!(path = request.path(), "request admitted");
                if let Some(hook) = &self.did_allow {
                    hook(request);
                }
                GateOutcome::Allowed
            }
            Verdict::Deny(denial) => {
                let mut metadata = DenialMetadata::default();

                if denial.is_rate_limit() {
                    if let Some(hook) = &self.did_deny {
                        hook(request, &mut metadata);
                    }
                } else if let Some(hook) = &self.did_error {
                    hook(request, &denial, &mut metadata);
                }

                GateOutcome::Denied {
                    status: denial.status,
                    reason: metadata.reason.or(Some(denial.reason)),
                    headers: metadata.headers,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Field, Scope, SlidingWindowConfig, TimeWindow, TokenBucketConfig};
    use crate::limiter::{SlidingWindowLog, TokenBucket};
    use crate::storage::MemoryDriver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_logging() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn bucket_gate(capacity: usize) -> AdmissionGate {
        let config = TokenBucketConfig {
            applied_field: Field::Header("X-ApiKey".to_string()),
            scope: Scope::Endpoint,
            bucket_size: capacity,
            refill_rate: 0,
            refill_interval: TimeWindow::Seconds(20),
        };
        AdmissionGate::new(Arc::new(TokenBucket::new(
            config,
            Arc::new(MemoryDriver::new()),
        )))
    }

    fn test_request() -> RateRequest {
        RateRequest::new("/v1/things").with_header("X-ApiKey", "key-a")
    }

    #[tokio::test]
    async fn test_allowed_outcome() {
        init_logging();
        let gate = bucket_gate(2);

        assert!(gate.admit(&test_request()).await.is_allowed());
    }

    #[tokio::test]
    async fn test_denied_outcome_carries_status_and_reason() {
        let gate = bucket_gate(1);
        let request = test_request();

        gate.admit(&request).await;
        let outcome = gate.admit(&request).await;

        match outcome {
            GateOutcome::Denied { status, reason, .. } => {
                assert_eq!(status, 429);
                assert!(reason.is_some());
            }
            GateOutcome::Allowed => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_check_hooks_fire() {
        let checks = Arc::new(AtomicUsize::new(0));
        let allows = Arc::new(AtomicUsize::new(0));

        let checks_hook = Arc::clone(&checks);
        let allows_hook = Arc::clone(&allows);
        let gate = bucket_gate(1)
            .on_will_check(move |_| {
                checks_hook.fetch_add(1, Ordering::SeqCst);
            })
            .on_did_allow(move |_| {
                allows_hook.fetch_add(1, Ordering::SeqCst);
            });

        let request = test_request();
        gate.admit(&request).await;
        gate.admit(&request).await;

        assert_eq!(checks.load(Ordering::SeqCst), 2);
        assert_eq!(allows.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_denial_hook_decorates_outcome() {
        let gate = bucket_gate(1).on_did_deny(|_, metadata| {
            metadata
                .headers
                .insert("Retry-After".to_string(), "20".to_string());
            metadata.reason = Some("slow down".to_string());
        });

        let request = test_request();
        gate.admit(&request).await;
        let outcome = gate.admit(&request).await;

        match outcome {
            GateOutcome::Denied {
                status,
                reason,
                headers,
            } => {
                assert_eq!(status, 429);
                assert_eq!(reason.as_deref(), Some("slow down"));
                assert_eq!(headers.get("Retry-After").map(String::as_str), Some("20"));
            }
            GateOutcome::Allowed => panic!("expected denial"),
        }
    }

    #[tokio::test]
    async fn test_error_hook_sees_unauthorized_denial() {
        let config = SlidingWindowConfig {
            applied_field: Field::Header("X-ApiKey".to_string()),
            scope: Scope::Endpoint,
            requests_per_window: 10,
            window: TimeWindow::Minutes(2),
        };
        let algorithm = Arc::new(SlidingWindowLog::new(config, Arc::new(MemoryDriver::new())));

        let statuses = Arc::new(AtomicUsize::new(0));
        let statuses_hook = Arc::clone(&statuses);
        let gate = AdmissionGate::new(algorithm).on_did_error(move |_, denial, _| {
            statuses_hook.store(denial.status as usize, Ordering::SeqCst);
        });

        // No classification header: the sliding window log fails closed.
        let outcome = gate.admit(&RateRequest::new("/v1/things")).await;

        assert!(!outcome.is_allowed());
        assert_eq!(statuses.load(Ordering::SeqCst), 401);
    }
}
