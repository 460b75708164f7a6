//! Auth configuration and credential types

use super::api_key::{ApiKeyAuth, BearerTokenAuth};
use super::oauth2::OAuth2Auth;
use super::session::SessionAuth;
use super::strategy::{AuthStrategy, NoAuth};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Authentication configuration of a connection
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,

    /// Form login producing a session cookie
    Session {
        /// Login name
        username: String,
        /// Login password
        password: String,
        /// Login path relative to the base URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        login_path: Option<String>,
    },

    /// Pre-shared API key exchanged for a bearer token at connect
    ApiKey {
        /// The API key
        api_key: String,
        /// Token path relative to the base URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_path: Option<String>,
    },

    /// API key exchanged for an expiring bearer token, refreshed on expiry
    BearerToken {
        /// The API key
        api_key: String,
        /// Token path relative to the base URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_path: Option<String>,
    },

    /// OAuth2 client or user credentials
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// Token endpoint and client settings
        configuration: OAuthConfiguration,
        /// Which token is used for requests
        #[serde(default)]
        access_type: AccessType,
    },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::None => f.write_str("None"),
            AuthConfig::Session {
                username,
                login_path,
                ..
            } => f
                .debug_struct("Session")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .field("login_path", login_path)
                .finish(),
            AuthConfig::ApiKey { token_path, .. } => f
                .debug_struct("ApiKey")
                .field("api_key", &"[REDACTED]")
                .field("token_path", token_path)
                .finish(),
            AuthConfig::BearerToken { token_path, .. } => f
                .debug_struct("BearerToken")
                .field("api_key", &"[REDACTED]")
                .field("token_path", token_path)
                .finish(),
            AuthConfig::OAuth2 {
                configuration,
                access_type,
            } => f
                .debug_struct("OAuth2")
                .field("configuration", configuration)
                .field("access_type", access_type)
                .finish(),
        }
    }
}

impl AuthConfig {
    /// Kind of strategy this configuration selects
    pub fn kind(&self) -> AuthKind {
        match self {
            AuthConfig::None => AuthKind::None,
            AuthConfig::Session { .. } => AuthKind::Session,
            AuthConfig::ApiKey { .. } => AuthKind::ApiKey,
            AuthConfig::BearerToken { .. } => AuthKind::BearerToken,
            AuthConfig::OAuth2 { .. } => AuthKind::OAuth2,
        }
    }

    /// Build the strategy selected by this configuration
    pub fn into_strategy(self) -> Arc<dyn AuthStrategy> {
        match self {
            AuthConfig::None => Arc::new(NoAuth),
            AuthConfig::Session {
                username,
                password,
                login_path,
            } => {
                let auth = SessionAuth::new(username, password);
                match login_path {
                    Some(path) => Arc::new(auth.with_login_path(&path)),
                    None => Arc::new(auth),
                }
            }
            AuthConfig::ApiKey {
                api_key,
                token_path,
            } => {
                let auth = ApiKeyAuth::new(api_key);
                match token_path {
                    Some(path) => Arc::new(auth.with_token_path(&path)),
                    None => Arc::new(auth),
                }
            }
            AuthConfig::BearerToken {
                api_key,
                token_path,
            } => {
                let auth = BearerTokenAuth::new(api_key);
                match token_path {
                    Some(path) => Arc::new(auth.with_token_path(&path)),
                    None => Arc::new(auth),
                }
            }
            AuthConfig::OAuth2 {
                configuration,
                access_type,
            } => Arc::new(OAuth2Auth::new(configuration, access_type)),
        }
    }
}

/// Authentication strategy kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthKind {
    /// No authentication
    None,
    /// Session cookie
    Session,
    /// API key exchanged for a bearer token
    ApiKey,
    /// Expiring bearer token
    BearerToken,
    /// OAuth2 token
    OAuth2,
}

impl AuthKind {
    /// Human readable name
    pub fn as_str(self) -> &'static str {
        match self {
            AuthKind::None => "none",
            AuthKind::Session => "session",
            AuthKind::ApiKey => "api key",
            AuthKind::BearerToken => "bearer token",
            AuthKind::OAuth2 => "oauth2",
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens after a request was answered with 401
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// Re-establish credentials and replay the request
    Reauthenticate,
    /// Surface the 401 to the caller
    GiveUp,
}

// ============================================================================
// OAuth2
// ============================================================================

/// Which OAuth2 token authorizes requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Token obtained on behalf of a user (authorization code, refresh token)
    User,
    /// Token obtained by the client itself (client credentials)
    #[default]
    Client,
}

/// OAuth2 client settings
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthConfiguration {
    /// Token endpoint
    pub token_uri: String,
    /// Client identifier
    pub client_id: String,
    /// Client secret, sent only when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Initial user refresh token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Redirect URI registered for the authorization code grant
    #[serde(default)]
    pub callback_url: String,
}

impl fmt::Debug for OAuthConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfiguration")
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("callback_url", &self.callback_url)
            .finish()
    }
}

/// Token endpoint answer
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Access token
    #[serde(alias = "access_token")]
    pub access_token: String,
    /// Refresh token, possibly rotated
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default, alias = "expires_in", skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// ============================================================================
// Bearer Credential
// ============================================================================

/// Bearer token with its CSRF companion and expiry
#[derive(Clone)]
pub struct BearerCredential {
    /// Bearer token
    pub token: String,
    /// Anti-forgery token echoed on every request
    pub csrf_token: Option<String>,
    /// When the token stops being valid
    pub expires_at: Option<DateTime<Utc>>,
}

impl BearerCredential {
    /// Credential without expiry
    pub fn new(token: impl Into<String>, csrf_token: Option<String>) -> Self {
        Self {
            token: token.into(),
            csrf_token,
            expires_at: None,
        }
    }

    /// Credential expiring `millis` from now, minus one second of slack
    pub fn from_expires_in_millis(
        token: impl Into<String>,
        csrf_token: Option<String>,
        millis: i64,
    ) -> Self {
        Self {
            token: token.into(),
            csrf_token,
            expires_at: Some(Utc::now() + Duration::milliseconds(millis) - Duration::seconds(1)),
        }
    }

    /// Credential with an explicit expiry instant
    #[must_use]
    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the expiry instant has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() >= expires_at)
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredential")
            .field("token", &"[REDACTED]")
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_credential_expiry_slack() {
        let credential = BearerCredential::from_expires_in_millis("t", None, 500);
        assert!(credential.is_expired());

        let credential = BearerCredential::from_expires_in_millis("t", None, 60_000);
        assert!(!credential.is_expired());
    }

    #[test]
    fn test_credential_without_expiry() {
        assert!(!BearerCredential::new("t", None).is_expired());
    }

    #[test]
    fn test_auth_config_default() {
        assert!(matches!(AuthConfig::default(), AuthConfig::None));
        assert_eq!(AuthConfig::default().kind(), AuthKind::None);
    }

    #[test]
    fn test_token_accepts_both_casings() {
        let camel: Token =
            serde_json::from_str(r#"{"accessToken":"a","refreshToken":"r","expiresIn":60}"#)
                .unwrap();
        let snake: Token =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r","expires_in":60}"#)
                .unwrap();
        assert_eq!(camel, snake);
    }
}
