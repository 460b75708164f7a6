//! OAuth2 token management
//!
//! `TokenManager` talks to the token endpoint and caches one token per
//! access type. `OAuth2Auth` plugs it into a connection.

use super::strategy::{AuthContext, AuthStrategy};
use super::types::{AccessType, AuthKind, ChallengeOutcome, OAuthConfiguration, Token};
use crate::error::{Error, Result};
use crate::types::{HeaderPairs, AUTHORIZATION};
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::debug;

/// Scope requested with the client credentials grant
pub const CLIENT_SCOPE: &str = "read write";

/// Obtains, caches and refreshes OAuth2 tokens
pub struct TokenManager {
    configuration: OAuthConfiguration,
    user_token: Mutex<Option<Token>>,
    client_token: Mutex<Option<Token>>,
    refresh_token: Mutex<Option<String>>,
}

impl TokenManager {
    /// Create a manager for `configuration`
    pub fn new(configuration: OAuthConfiguration) -> Self {
        let refresh_token = configuration
            .refresh_token
            .clone()
            .filter(|token| !token.trim().is_empty());
        Self {
            configuration,
            user_token: Mutex::new(None),
            client_token: Mutex::new(None),
            refresh_token: Mutex::new(refresh_token),
        }
    }

    /// Client settings
    pub fn configuration(&self) -> &OAuthConfiguration {
        &self.configuration
    }

    /// Current user refresh token
    pub async fn current_refresh_token(&self) -> Option<String> {
        self.refresh_token.lock().await.clone()
    }

    /// Exchange an authorization code for a user token
    pub async fn exchange_for_user_token(&self, client: &Client, code: &str) -> Result<Token> {
        let mut slot = self.user_token.lock().await;
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("redirect_uri", self.configuration.callback_url.clone()),
            ("client_id", self.configuration.client_id.clone()),
            ("code", code.to_string()),
        ];
        self.push_secret(&mut form);

        let token = self.request_token(client, &form).await.map_err(|e| Error::OAuth2 {
            message: format!("Authorization code exchange failed: {e}"),
        })?;
        self.remember(&mut slot, &token).await;
        Ok(token)
    }

    /// Obtain a fresh token for `access_type`, replacing the cached one
    pub async fn refresh_token(&self, client: &Client, access_type: AccessType) -> Result<Token> {
        let mut slot = self.slot(access_type).lock().await;
        let token = self.fetch(client, access_type).await?;
        self.remember(&mut slot, &token).await;
        Ok(token)
    }

    /// Cached token for `access_type`, fetched on first use
    pub async fn get_token(&self, client: &Client, access_type: AccessType) -> Result<Token> {
        let mut slot = self.slot(access_type).lock().await;
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let token = self.fetch(client, access_type).await?;
        self.remember(&mut slot, &token).await;
        Ok(token)
    }

    fn slot(&self, access_type: AccessType) -> &Mutex<Option<Token>> {
        match access_type {
            AccessType::User => &self.user_token,
            AccessType::Client => &self.client_token,
        }
    }

    async fn fetch(&self, client: &Client, access_type: AccessType) -> Result<Token> {
        let mut form = match access_type {
            AccessType::User => {
                let refresh_token = self.current_refresh_token().await.ok_or_else(|| {
                    Error::TokenRefresh {
                        message: "No token present to refresh".to_string(),
                    }
                })?;
                vec![
                    ("grant_type", "refresh_token".to_string()),
                    ("refresh_token", refresh_token),
                    ("client_id", self.configuration.client_id.clone()),
                ]
            }
            AccessType::Client => vec![
                ("grant_type", "client_credentials".to_string()),
                ("scope", CLIENT_SCOPE.to_string()),
                ("client_id", self.configuration.client_id.clone()),
            ],
        };
        self.push_secret(&mut form);

        debug!(?access_type, "Requesting OAuth2 token");
        self.request_token(client, &form)
            .await
            .map_err(|e| Error::TokenRefresh {
                message: e.to_string(),
            })
    }

    fn push_secret(&self, form: &mut Vec<(&'static str, String)>) {
        if let Some(secret) = self
            .configuration
            .client_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
        {
            form.push(("client_secret", secret.clone()));
        }
    }

    async fn request_token(&self, client: &Client, form: &[(&str, String)]) -> Result<Token> {
        let response = client
            .post(&self.configuration.token_uri)
            .form(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::OAuth2 {
                message: format!("Token request failed with status {status}: {body}"),
            });
        }

        Ok(response.json::<Token>().await?)
    }

    async fn remember(&self, slot: &mut Option<Token>, token: &Token) {
        if let Some(rotated) = token
            .refresh_token
            .as_ref()
            .filter(|rotated| !rotated.is_empty())
        {
            *self.refresh_token.lock().await = Some(rotated.clone());
        }
        *slot = Some(token.clone());
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("configuration", &self.configuration)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Strategy
// ============================================================================

/// OAuth2 bearer authentication
#[derive(Debug)]
pub struct OAuth2Auth {
    manager: TokenManager,
    access_type: AccessType,
}

impl OAuth2Auth {
    /// Create an OAuth2 strategy
    pub fn new(configuration: OAuthConfiguration, access_type: AccessType) -> Self {
        Self {
            manager: TokenManager::new(configuration),
            access_type,
        }
    }

    /// Token manager backing this strategy
    pub fn manager(&self) -> &TokenManager {
        &self.manager
    }

    /// Access type used for requests
    pub fn access_type(&self) -> AccessType {
        self.access_type
    }
}

#[async_trait]
impl AuthStrategy for OAuth2Auth {
    fn kind(&self) -> AuthKind {
        AuthKind::OAuth2
    }

    fn prepare(&self) -> Result<()> {
        let configuration = self.manager.configuration();
        if configuration.token_uri.trim().is_empty() {
            return Err(Error::missing_credentials(self.kind().as_str(), "token_uri"));
        }
        if configuration.client_id.trim().is_empty() {
            return Err(Error::missing_credentials(self.kind().as_str(), "client_id"));
        }
        Ok(())
    }

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()> {
        self.manager
            .refresh_token(&ctx.client, self.access_type)
            .await
            .map(|_| ())
    }

    async fn auth_headers(&self, ctx: &AuthContext) -> Result<HeaderPairs> {
        let token = self.manager.get_token(&ctx.client, self.access_type).await?;
        Ok(vec![(
            AUTHORIZATION.to_string(),
            format!("Bearer {}", token.access_token),
        )])
    }

    fn on_unauthorized(&self, retries: u32) -> ChallengeOutcome {
        if retries == 0 {
            ChallengeOutcome::Reauthenticate
        } else {
            ChallengeOutcome::GiveUp
        }
    }
}
