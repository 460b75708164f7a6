//! Error types for hub-rest
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for hub-rest
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Trust Errors
    // ============================================================================
    #[error("Certificate trust error: {message}")]
    Trust { message: String },

    #[error("Trust store '{path}' is unusable: {message}")]
    TrustStore { path: String, message: String },

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Missing credentials: {field} is required for {strategy} authentication")]
    MissingCredentials { strategy: String, field: String },

    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    #[error("OAuth2 error: {message}")]
    OAuth2 { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("There was a problem trying to {method} {url}: {status} {message}")]
    HttpStatus {
        status: u16,
        message: String,
        method: String,
        url: String,
    },

    #[error("Connection failed, call connect() to re-establish it: {message}")]
    ConnectionFailed { message: String },

    // ============================================================================
    // Protocol Errors
    // ============================================================================
    #[error("Protocol violation: {message}")]
    Protocol { message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Context
    // ============================================================================
    #[error("{message}: {source}")]
    Context {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid configuration
    Config,
    /// Trust store or TLS validation problem
    Trust,
    /// Credential exchange or refresh problem
    Auth,
    /// Non-2xx answer or unusable connection
    Http,
    /// Server answered with something that breaks the paging contract
    Protocol,
    /// Network or filesystem failure
    Io,
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a trust error
    pub fn trust(message: impl Into<String>) -> Self {
        Self::Trust {
            message: message.into(),
        }
    }

    /// Create a trust store error
    pub fn trust_store(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TrustStore {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a missing credentials error
    pub fn missing_credentials(strategy: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingCredentials {
            strategy: strategy.into(),
            field: field.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(
        status: u16,
        message: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
            method: method.into(),
            url: url.into(),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config { .. }
            | Error::MissingConfigField { .. }
            | Error::InvalidConfigValue { .. }
            | Error::InvalidUrl(_)
            | Error::YamlParse(_)
            | Error::JsonParse(_) => ErrorCategory::Config,
            Error::Trust { .. } | Error::TrustStore { .. } => ErrorCategory::Trust,
            Error::Auth { .. }
            | Error::MissingCredentials { .. }
            | Error::TokenRefresh { .. }
            | Error::OAuth2 { .. } => ErrorCategory::Auth,
            Error::HttpStatus { .. } | Error::ConnectionFailed { .. } => ErrorCategory::Http,
            Error::Protocol { .. } => ErrorCategory::Protocol,
            Error::Http(_) | Error::Io(_) => ErrorCategory::Io,
            Error::Context { source, .. } => source.category(),
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::Context { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Check if this error is a 401 answer from the server
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == Some(401)
    }
}

/// Result type alias for hub-rest
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            message: message.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Context {
            message: f(),
            source: Box::new(e.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("test message");
        assert_eq!(err.to_string(), "Configuration error: test message");

        let err = Error::missing_field("base_url");
        assert_eq!(err.to_string(), "Missing required config field: base_url");

        let err = Error::http_status(404, "Not Found", "GET", "https://hub.example.com/api/x");
        assert_eq!(
            err.to_string(),
            "There was a problem trying to GET https://hub.example.com/api/x: 404 Not Found"
        );
    }

    #[test]
    fn test_category() {
        assert_eq!(Error::config("x").category(), ErrorCategory::Config);
        assert_eq!(Error::trust("x").category(), ErrorCategory::Trust);
        assert_eq!(
            Error::trust_store("/tmp/cacerts", "corrupt").category(),
            ErrorCategory::Trust
        );
        assert_eq!(Error::auth("x").category(), ErrorCategory::Auth);
        assert_eq!(
            Error::missing_credentials("api key", "api_key").category(),
            ErrorCategory::Auth
        );
        assert_eq!(
            Error::http_status(500, "", "GET", "").category(),
            ErrorCategory::Http
        );
        assert_eq!(Error::protocol("x").category(), ErrorCategory::Protocol);
        assert_eq!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom")).category(),
            ErrorCategory::Io
        );
    }

    #[test]
    fn test_status_code() {
        let err = Error::http_status(401, "Unauthorized", "GET", "/");
        assert_eq!(err.status_code(), Some(401));
        assert!(err.is_unauthorized());

        assert!(!Error::http_status(403, "Forbidden", "GET", "/").is_unauthorized());
        assert_eq!(Error::auth("nope").status_code(), None);
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let with_context = result.context("outer");
        assert!(with_context
            .unwrap_err()
            .to_string()
            .contains("outer: Configuration error: inner"));
    }

    #[test]
    fn test_context_keeps_category() {
        let io: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = io.with_context(|| "Failed to read config".to_string()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Io);

        let status: Result<()> = Err(Error::http_status(404, "Not Found", "GET", "/"));
        let err = status.context("lookup").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Http);
        assert_eq!(err.status_code(), Some(404));
    }
}
