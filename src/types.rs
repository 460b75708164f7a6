//! Common types used throughout hub-rest
//!
//! Shared type aliases and the well-known header names of the backend.

use std::collections::HashMap;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

/// Ordered list of header name/value pairs
pub type HeaderPairs = Vec<(String, String)>;

// ============================================================================
// Header Names
// ============================================================================

/// Standard authorization header
pub const AUTHORIZATION: &str = "Authorization";

/// Header answering a proxy challenge
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

/// Header carrying a proxy challenge
pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";

/// Anti-forgery token issued by the token endpoint and echoed afterwards
pub const X_CSRF_TOKEN: &str = "X-CSRF-TOKEN";

/// Headers whose values must never reach the logs
pub const SENSITIVE_HEADERS: [&str; 5] = [
    AUTHORIZATION,
    PROXY_AUTHORIZATION,
    X_CSRF_TOKEN,
    "Cookie",
    "Set-Cookie",
];

/// Check whether a header holds a secret
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}
