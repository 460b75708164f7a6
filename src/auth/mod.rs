//! Authentication module
//!
//! Supports: Session cookie, API Key, expiring Bearer Token, OAuth2
//!
//! Every strategy implements [`AuthStrategy`]. A connection holds exactly
//! one, selected from [`AuthConfig`] at construction, and asks it for
//! credentials at connect time and for headers on every request.

mod api_key;
mod oauth2;
mod session;
mod strategy;
mod types;

pub use api_key::{ApiKeyAuth, BearerTokenAuth, DEFAULT_BEARER_TOKEN_PATH, DEFAULT_TOKEN_PATH};
pub use oauth2::{OAuth2Auth, TokenManager, CLIENT_SCOPE};
pub use session::{SessionAuth, DEFAULT_LOGIN_PATH};
pub use strategy::{AuthContext, AuthStrategy, NoAuth};
pub use types::{
    AccessType, AuthConfig, AuthKind, BearerCredential, ChallengeOutcome, OAuthConfiguration,
    Token,
};
