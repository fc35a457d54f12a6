//! Rate-limit key derivation.
//!
//! A key is derived from two resolved request values: the configured
//! classification field (prefix) and scope (suffix). The combination is
//! order-sensitive and hashed with SHA-256 so the same inputs always produce
//! the same key, within a process and across processes. Derivation fails
//! when a configured header, query parameter, or host is absent; each
//! algorithm decides whether that failure is fail-open or fail-closed.

use sha2::{Digest, Sha256};

use crate::config::{Field, Scope};
use crate::error::{Result, TollgateError};
use crate::request::RateRequest;

/// Sentinel used when no classification field is configured.
const NO_FIELD_VALUE: &str = "tollgate#no.field";
/// Sentinel used when no scope is configured.
const NO_SCOPE_VALUE: &str = "tollgate#no.scope";

/// Separator between the field and scope halves of the hash input, so that
/// ("ab", "c") and ("a", "bc") cannot collide.
const KEY_SEPARATOR: u8 = 0x1f;

/// Derive the rate-limit key for a request under the given field and scope.
pub fn derive_key(field: &Field, scope: &Scope, request: &RateRequest) -> Result<String> {
    let prefix = resolve_field(field, request)?;
    let suffix = resolve_scope(scope, request)?;

    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update([KEY_SEPARATOR]);
    hasher.update(suffix.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

fn resolve_field<'a>(field: &Field, request: &'a RateRequest) -> Result<&'a str> {
    match field {
        Field::Header(name) => request.header(name).ok_or_else(|| {
            TollgateError::Unclassifiable(format!("header {} not present in request", name))
        }),
        Field::QueryParameter(name) => request.query(name).ok_or_else(|| {
            TollgateError::Unclassifiable(format!("query parameter {} not present in request", name))
        }),
        Field::None => Ok(NO_FIELD_VALUE),
    }
}

fn resolve_scope<'a>(scope: &Scope, request: &'a RateRequest) -> Result<&'a str> {
    match scope {
        Scope::Endpoint => Ok(request.path()),
        Scope::Host => request
            .host()
            .ok_or_else(|| TollgateError::Unclassifiable("host not present in request".into())),
        Scope::None => Ok(NO_SCOPE_VALUE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let field = Field::Header("X-ApiKey".to_string());
        let scope = Scope::Endpoint;
        let request = RateRequest::new("/x").with_header("X-ApiKey", "a");

        let first = derive_key(&field, &scope, &request).unwrap();
        let second = derive_key(&field, &scope, &request).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_scope_value_changes_key() {
        let field = Field::Header("X-ApiKey".to_string());
        let scope = Scope::Endpoint;

        let request_x = RateRequest::new("/x").with_header("X-ApiKey", "a");
        let request_y = RateRequest::new("/y").with_header("X-ApiKey", "a");

        let key_x = derive_key(&field, &scope, &request_x).unwrap();
        let key_y = derive_key(&field, &scope, &request_y).unwrap();
        assert_ne!(key_x, key_y);
    }

    #[test]
    fn test_field_value_changes_key() {
        let field = Field::Header("X-ApiKey".to_string());
        let scope = Scope::None;

        let request_a = RateRequest::new("/x").with_header("X-ApiKey", "a");
        let request_b = RateRequest::new("/x").with_header("X-ApiKey", "b");

        assert_ne!(
            derive_key(&field, &scope, &request_a).unwrap(),
            derive_key(&field, &scope, &request_b).unwrap()
        );
    }

    #[test]
    fn test_missing_header_is_unclassifiable() {
        let field = Field::Header("X-ApiKey".to_string());
        let request = RateRequest::new("/x");

        let result = derive_key(&field, &Scope::None, &request);
        assert!(matches!(result, Err(TollgateError::Unclassifiable(_))));
    }

    #[test]
    fn test_missing_query_parameter_is_unclassifiable() {
        let field = Field::QueryParameter("token".to_string());
        let request = RateRequest::new("/x");

        let result = derive_key(&field, &Scope::None, &request);
        assert!(matches!(result, Err(TollgateError::Unclassifiable(_))));
    }

    #[test]
    fn test_missing_host_is_unclassifiable() {
        let request = RateRequest::new("/x");

        let result = derive_key(&Field::None, &Scope::Host, &request);
        assert!(matches!(result, Err(TollgateError::Unclassifiable(_))));
    }

    #[test]
    fn test_sentinels_apply_when_nothing_configured() {
        let request_a = RateRequest::new("/a");
        let request_b = RateRequest::new("/b");

        // With no field and no scope, every request collapses to one key.
        let key_a = derive_key(&Field::None, &Scope::None, &request_a).unwrap();
        let key_b = derive_key(&Field::None, &Scope::None, &request_b).unwrap();
        assert_eq!(key_a, key_b);
    }

    #[test]
    fn test_query_parameter_field() {
        let field = Field::QueryParameter("token".to_string());
        let request = RateRequest::new("/x").with_query("token", "t-1");

        assert!(derive_key(&field, &Scope::Endpoint, &request).is_ok());
    }
}
