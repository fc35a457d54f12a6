//! Tollgate - Request Admission Control Engine
//!
//! This crate decides, in bounded time, whether an incoming request should
//! be allowed or rejected against a configurable rate limit. Four
//! algorithms with different accuracy/cost/burst-tolerance trade-offs
//! (fixed window counter, leaking bucket, sliding window log, token bucket)
//! share a common request-classification and storage abstraction, so the
//! same engine runs against an in-process map or a shared remote counter
//! store.

pub mod config;
pub mod error;
pub mod gate;
pub mod key;
pub mod limiter;
pub mod request;
pub mod storage;
pub mod token;

pub use config::{
    Field, FixedWindowConfig, LeakingBucketConfig, Scope, SlidingWindowConfig, TimeWindow,
    TokenBucketConfig,
};
pub use error::{Result, TollgateError};
pub use gate::{AdmissionGate, DenialMetadata, GateOutcome};
pub use limiter::{
    Denial, FixedWindowCounter, LeakingBucket, RateLimitAlgorithm, SlidingWindowLog, TokenBucket,
    Verdict,
};
pub use request::RateRequest;
pub use storage::{MemoryDriver, RedisDriver, StorageDriver};
pub use token::{Token, TokenList};
