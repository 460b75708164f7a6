//! Session cookie authentication
//!
//! Logs in with a form post; the server answers with a session cookie that
//! the shared cookie jar replays on every later request.

use super::strategy::{path_segments, AuthContext, AuthStrategy};
use super::types::AuthKind;
use crate::error::{Error, Result};
use crate::types::HeaderPairs;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::ClientBuilder;
use std::sync::Arc;
use tracing::debug;

/// Default login path
pub const DEFAULT_LOGIN_PATH: &str = "j_spring_security_check";

/// Form login with a session cookie
pub struct SessionAuth {
    username: String,
    password: String,
    login_segments: Vec<String>,
    jar: Arc<Jar>,
}

impl SessionAuth {
    /// Create a session strategy
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            login_segments: path_segments(DEFAULT_LOGIN_PATH),
            jar: Arc::new(Jar::default()),
        }
    }

    /// Use a different login path
    #[must_use]
    pub fn with_login_path(mut self, path: &str) -> Self {
        self.login_segments = path_segments(path);
        self
    }

    /// Cookie jar holding the session
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }
}

impl std::fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAuth")
            .field("username", &self.username)
            .field("login_segments", &self.login_segments)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthStrategy for SessionAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::Session
    }

    fn prepare(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::missing_credentials(AuthKind::Session.as_str(), "username"));
        }
        if self.password.is_empty() {
            return Err(Error::missing_credentials(AuthKind::Session.as_str(), "password"));
        }
        Ok(())
    }

    fn configure(&self, builder: ClientBuilder) -> ClientBuilder {
        builder.cookie_provider(self.jar())
    }

    async fn authenticate(&self, ctx: &AuthContext) -> Result<()> {
        let url = ctx.url_for(&self.login_segments)?;
        debug!(%url, username = %self.username, "Logging in");

        let form = [
            ("j_username", self.username.as_str()),
            ("j_password", self.password.as_str()),
        ];
        let response = ctx.client.post(url).form(&form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::auth(format!(
                "Login failed with status {}",
                status.as_u16()
            )));
        }
        Ok(())
    }

    async fn auth_headers(&self, _ctx: &AuthContext) -> Result<HeaderPairs> {
        // The cookie jar carries the session
        Ok(Vec::new())
    }
}
