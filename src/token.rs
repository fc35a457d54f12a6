//! Tokens and the per-key token log.
//!
//! A [`Token`] records one admitted (or pending) request occurrence. A
//! [`TokenList`] is the ordered log of tokens for a single key; it is the
//! value type stored by list-based drivers and is only ever mutated through
//! the operations below.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A single request occurrence: a timestamp plus a unique id.
///
/// Tokens are equal iff their timestamps are equal and order by timestamp;
/// the id only disambiguates entries in storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
}

impl Token {
    /// Create a token stamped with the current time.
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            id: Uuid::new_v4(),
        }
    }

    /// Whether this token is older than `window` relative to now.
    pub fn is_older_than(&self, window: Duration) -> bool {
        let mark = Utc::now() - ChronoDuration::from_std(window).unwrap_or(ChronoDuration::zero());
        self.timestamp < mark
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for Token {}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Token {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

/// Ordered token log owned by exactly one rate-limit key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenList {
    tokens: Vec<Token>,
}

impl TokenList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a list pre-filled with `count` fresh tokens (a full bucket).
    pub fn filled(count: usize) -> Self {
        Self {
            tokens: (0..count).map(|_| Token::new()).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Append one token.
    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Append a batch of tokens.
    pub fn append_many(&mut self, tokens: Vec<Token>) {
        self.tokens.extend(tokens);
    }

    /// Remove the oldest token. No-op when the list is empty.
    pub fn pop_oldest(&mut self) {
        if self.tokens.is_empty() {
            return;
        }
        self.tokens.remove(0);
    }

    /// Drop every token older than `window` relative to now.
    pub fn remove_older_than(&mut self, window: Duration) {
        self.tokens.retain(|token| !token.is_older_than(window));
    }

    /// Drop the `count` oldest tokens. No-op when `count` is not strictly
    /// smaller than the current length, guarding against over-deletion.
    pub fn remove_count(&mut self, count: usize) {
        if count >= self.tokens.len() {
            return;
        }
        self.tokens.drain(0..count);
    }
}
