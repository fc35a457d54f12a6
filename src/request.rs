//! Request descriptor consumed by the classification logic.
//!
//! The engine never sees framework request types; the surrounding middleware
//! extracts the fields that matter into a [`RateRequest`].

use std::collections::HashMap;

/// The parts of an incoming request that rate limiting can key on.
#[derive(Debug, Clone, Default)]
pub struct RateRequest {
    path: String,
    host: Option<String>,
    /// Header values by lowercased name, in arrival order
    headers: HashMap<String, Vec<String>>,
    query: HashMap<String, String>,
}

impl RateRequest {
    /// Create a descriptor for a request to the given path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the request host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add a header value. Names are matched case-insensitively.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// Add a query-string parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request host, if one was supplied.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// First value of the named header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Value of the named query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = RateRequest::new("/v1/things").with_header("X-ApiKey", "abc123");

        assert_eq!(request.header("x-apikey"), Some("abc123"));
        assert_eq!(request.header("X-APIKEY"), Some("abc123"));
        assert_eq!(request.header("x-other"), None);
    }

    #[test]
    fn test_header_first_value_wins() {
        let request = RateRequest::new("/")
            .with_header("X-ApiKey", "first")
            .with_header("x-apikey", "second");

        assert_eq!(request.header("X-ApiKey"), Some("first"));
    }

    #[test]
    fn test_query_and_host() {
        let request = RateRequest::new("/search")
            .with_host("api.example.com")
            .with_query("token", "t-1");

        assert_eq!(request.path(), "/search");
        assert_eq!(request.host(), Some("api.example.com"));
        assert_eq!(request.query("token"), Some("t-1"));
        assert_eq!(request.query("other"), None);
    }
}
