//! Configuration types for the rate limiting algorithms.
//!
//! Each algorithm instance is constructed from an immutable configuration
//! value: the classification field and scope that partition traffic into
//! keys, plus the numeric parameters specific to that algorithm. Loading
//! these from files or the environment belongs to the surrounding process,
//! not to this crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where to extract the rate-limit subject from a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Use the first value of the named header.
    Header(String),
    /// Use the named query-string parameter.
    QueryParameter(String),
    /// No subject field; all requests share a fixed sentinel value.
    None,
}

/// The partition a limit applies within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Partition by request path.
    Endpoint,
    /// Partition by request host; requests without a host are unclassifiable.
    Host,
    /// No partition; all requests share a fixed sentinel value.
    None,
}

/// Time window for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Seconds(u64),
    Minutes(u64),
    Hours(u64),
}

impl TimeWindow {
    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Seconds(count) => Duration::from_secs(*count),
            TimeWindow::Minutes(count) => Duration::from_secs(count * 60),
            TimeWindow::Hours(count) => Duration::from_secs(count * 3600),
        }
    }
}

/// Configuration for the fixed window counter algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindowConfig {
    /// Field the limit is keyed on
    pub applied_field: Field,
    /// Scope the limit is partitioned within
    pub scope: Scope,
    /// Maximum requests allowed per window
    pub requests_per_window: usize,
    /// Window duration; also the reset cadence
    pub window: TimeWindow,
}

impl Default for FixedWindowConfig {
    fn default() -> Self {
        Self {
            applied_field: Field::None,
            scope: Scope::None,
            requests_per_window: 10,
            window: TimeWindow::Minutes(1),
        }
    }
}

/// Configuration for the leaking bucket algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakingBucketConfig {
    /// Field the limit is keyed on
    pub applied_field: Field,
    /// Scope the limit is partitioned within
    pub scope: Scope,
    /// Bucket capacity in pending requests
    pub bucket_size: usize,
    /// Tokens drained per leak tick
    pub leak_rate: usize,
    /// Leak cadence
    pub leak_interval: TimeWindow,
}

impl Default for LeakingBucketConfig {
    fn default() -> Self {
        Self {
            applied_field: Field::None,
            scope: Scope::None,
            bucket_size: 10,
            leak_rate: 5,
            leak_interval: TimeWindow::Minutes(1),
        }
    }
}

/// Configuration for the sliding window log algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Field the limit is keyed on
    pub applied_field: Field,
    /// Scope the limit is partitioned within
    pub scope: Scope,
    /// Maximum requests allowed within any window-sized interval
    pub requests_per_window: usize,
    /// Window duration, evaluated relative to each request's own "now"
    pub window: TimeWindow,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            applied_field: Field::None,
            scope: Scope::None,
            requests_per_window: 10,
            window: TimeWindow::Minutes(2),
        }
    }
}

/// Configuration for the token bucket algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Field the limit is keyed on
    pub applied_field: Field,
    /// Scope the limit is partitioned within
    pub scope: Scope,
    /// Bucket capacity in consumable tokens
    pub bucket_size: usize,
    /// Tokens added per refill tick
    pub refill_rate: usize,
    /// Refill cadence
    pub refill_interval: TimeWindow,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            applied_field: Field::None,
            scope: Scope::None,
            bucket_size: 10,
            refill_rate: 5,
            refill_interval: TimeWindow::Seconds(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_duration() {
        assert_eq!(TimeWindow::Seconds(10).duration(), Duration::from_secs(10));
        assert_eq!(TimeWindow::Minutes(2).duration(), Duration::from_secs(120));
        assert_eq!(TimeWindow::Hours(1).duration(), Duration::from_secs(3600));
    }

    #[test]
    fn test_default_configs() {
        let config = FixedWindowConfig::default();
        assert_eq!(config.applied_field, Field::None);
        assert_eq!(config.requests_per_window, 10);

        let config = TokenBucketConfig::default();
        assert_eq!(config.bucket_size, 10);
        assert_eq!(config.refill_interval, TimeWindow::Seconds(20));
    }
}
