//! The authentication strategy capability

use super::types::{AuthKind, ChallengeOutcome};
use crate::error::Result;
use crate::http::{build_url, RequestDescriptor};
use crate::types::HeaderPairs;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::collections::BTreeMap;
use url::Url;

/// Transport handed to a strategy when it talks to the backend
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Transport configured by the connection
    pub client: Client,
    /// Base URL of the backend
    pub base_url: Url,
}

impl AuthContext {
    /// Create a context
    pub fn new(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// URL of `segments` below the base URL
    pub fn url_for<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        build_url(self.base_url.as_str(), segments, &BTreeMap::new())
    }
}

/// Establishes and attaches credentials for a connection
///
/// Exactly one strategy is active per connection. Implementations keep their
/// credential state behind async locks so one instance can serve many
/// concurrent requests.
#[async_trait]
pub trait AuthStrategy: Send + Sync + std::fmt::Debug {
    /// Which strategy this is
    fn kind(&self) -> AuthKind;

    /// Check that the required inputs are present
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Transport-level setup, such as installing a cookie jar
    fn configure(&self, builder: ClientBuilder) -> ClientBuilder {
        builder
    }

    /// Obtain fresh credentials
    async fn authenticate(&self, ctx: &AuthContext) -> Result<()>;

    /// Headers that authorize one request
    async fn auth_headers(&self, ctx: &AuthContext) -> Result<HeaderPairs>;

    /// Copy of `request` carrying the current credentials
    async fn decorate(
        &self,
        ctx: &AuthContext,
        request: &RequestDescriptor,
    ) -> Result<RequestDescriptor> {
        let headers = self.auth_headers(ctx).await?;
        Ok(request.rebuild(&headers))
    }

    /// Decide what to do after a 401; `retries` counts earlier replays
    fn on_unauthorized(&self, _retries: u32) -> ChallengeOutcome {
        ChallengeOutcome::Reauthenticate
    }
}

/// Unauthenticated access
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl AuthStrategy for NoAuth {
    fn kind(&self) -> AuthKind {
        AuthKind::None
    }

    async fn authenticate(&self, _ctx: &AuthContext) -> Result<()> {
        Ok(())
    }

    async fn auth_headers(&self, _ctx: &AuthContext) -> Result<HeaderPairs> {
        Ok(Vec::new())
    }

    fn on_unauthorized(&self, _retries: u32) -> ChallengeOutcome {
        // Nothing to refresh
        ChallengeOutcome::GiveUp
    }
}

/// Split a slash separated path into segments
pub(crate) fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}
