//! API key and expiring bearer token authentication
//!
//! Both strategies exchange a pre-shared API key for a bearer token by
//! posting `Authorization: token <key>` to the token path. The answer carries
//! `bearerToken` (and `expiresInMilliseconds`) in the body and a CSRF token
//! in the `X-CSRF-TOKEN` response header.

use super::strategy::{path_segments, AuthContext, AuthStrategy};
use super::types::{AuthKind, BearerCredential};
use crate::error::{Error, Result};
use crate::types::{HeaderPairs, AUTHORIZATION, X_CSRF_TOKEN};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::ClientBuilder;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default token exchange path of the API key strategy
pub const DEFAULT_TOKEN_PATH: &str = "api/tokens/authenticate";

/// Default token exchange path of the bearer token strategy
pub const DEFAULT_BEARER_TOKEN_PATH: &str = "token/authenticate";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAnswer {
    bearer_token: Option<String>,
    #[serde(default)]
    expires_in_milliseconds: Option<i64>,
}

/// Exchange `api_key` for a bearer credential
async fn exchange_api_key(
    ctx: &AuthContext,
    segments: &[String],
    api_key: &str,
) -> Result<BearerCredential> {
    let url = ctx.url_for(segments)?;
    debug!(%url, "Exchanging API key for a bearer token");

    let response = ctx
        .client
        .post(url)
        .header(AUTHORIZATION, format!("token {api_key}"))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::auth(format!(
            "Token request failed with status {}",
            status.as_u16()
        )));
    }

    let csrf_token = response
        .headers()
        .get(X_CSRF_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(String::from);

    let answer: TokenAnswer = response.json().await?;
    let token = answer
        .bearer_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| Error::auth("Token response did not contain a bearerToken"))?;

    Ok(match answer.expires_in_milliseconds {
        Some(millis) => BearerCredential::from_expires_in_millis(token, csrf_token, millis),
        None => BearerCredential::new(token, csrf_token),
    })
}

fn bearer_headers(credential: &BearerCredential) -> HeaderPairs {
    let mut headers = vec![(
        AUTHORIZATION.to_string(),
        format!("Bearer {}", credential.token),
    )];
    if let Some(csrf) = &credential.csrf_token {
        headers.push((X_CSRF_TOKEN.to_string(), csrf.clone()));
    }
    headers
}

fn require_key(kind: AuthKind, api_key: &str) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(Error::missing_credentials(kind.as_str(), "api_key"));
    }
    Ok(())
}

// ============================================================================
// API Key
// ============================================================================

/// API key exchanged for a bearer token at connect time
pub struct ApiKeyAuth {
    api_key: String,
    token_segments: Vec<String>,
    credential: RwLock<Option<BearerCredential>>,
}

impl ApiKeyAuth {
    /// Create an API key strategy
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            token_segments: path_segments(DEFAULT_TOKEN_PATH),
            credential: RwLock::new(None),
        }
    }

    /// Use a different token path
    #[must_use]
    pub fn with_token_path(mut self, path: &str) -> Self {
        self.token_segments = path_segments(path);
        self
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("api_key", &"[REDACTED]")
            .field("token_segments", &self.token_segments)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for ApiKeyAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::ApiKey
    }

    fn prepare(&self) -> Result<()> {
        require_key(self.kind(), &self.api_key)
    }

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()> {
        let credential = exchange_api_key(ctx, &self.token_segments, &self.api_key).await?;
        *self.credential.write().await = Some(credential);
        Ok(())
    }

    async fn auth_headers(&self, ctx: &AuthContext) -> Result<HeaderPairs> {
        {
            let cached = self.credential.read().await;
            if let Some(credential) = cached.as_ref() {
                return Ok(bearer_headers(credential));
            }
        }

        let mut cached = self.credential.write().await;
        if let Some(credential) = cached.as_ref() {
            return Ok(bearer_headers(credential));
        }
        let credential = exchange_api_key(ctx, &self.token_segments, &self.api_key).await?;
        let headers = bearer_headers(&credential);
        *cached = Some(credential);
        Ok(headers)
    }
}

// ============================================================================
// Bearer Token
// ============================================================================

/// API key exchanged for an expiring bearer token
///
/// The token is renewed when it expires. Renewal happens under the credential
/// lock so concurrent callers wait for a single exchange.
pub struct BearerTokenAuth {
    api_key: String,
    token_segments: Vec<String>,
    credential: Mutex<Option<BearerCredential>>,
    jar: Arc<Jar>,
}

impl BearerTokenAuth {
    /// Create a bearer token strategy
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            token_segments: path_segments(DEFAULT_BEARER_TOKEN_PATH),
            credential: Mutex::new(None),
            jar: Arc::new(Jar::default()),
        }
    }

    /// Use a different token path
    #[must_use]
    pub fn with_token_path(mut self, path: &str) -> Self {
        self.token_segments = path_segments(path);
        self
    }

    /// Start from an existing credential
    #[must_use]
    pub fn with_credential(self, credential: BearerCredential) -> Self {
        Self {
            credential: Mutex::new(Some(credential)),
            ..self
        }
    }

    /// Current credential, if any
    pub async fn credential(&self) -> Option<BearerCredential> {
        self.credential.lock().await.clone()
    }
}

impl std::fmt::Debug for BearerTokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuth")
            .field("api_key", &"[REDACTED]")
            .field("token_segments", &self.token_segments)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for BearerTokenAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::BearerToken
    }

    fn prepare(&self) -> Result<()> {
        require_key(self.kind(), &self.api_key)
    }

    fn configure(&self, builder: ClientBuilder) -> ClientBuilder {
        builder.cookie_provider(Arc::clone(&self.jar))
    }

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()> {
        let mut cached = self.credential.lock().await;
        let credential = exchange_api_key(ctx, &self.token_segments, &self.api_key).await?;
        *cached = Some(credential);
        Ok(())
    }

    async fn auth_headers(&self, ctx: &AuthContext) -> Result<HeaderPairs> {
        let mut cached = self.credential.lock().await;
        if let Some(credential) = cached.as_ref() {
            if !credential.is_expired() {
                return Ok(bearer_headers(credential));
            }
            debug!("Bearer token expired, renewing");
        }

        let credential = exchange_api_key(ctx, &self.token_segments, &self.api_key).await?;
        let headers = bearer_headers(&credential);
        *cached = Some(credential);
        Ok(headers)
    }
}
