//! Authenticated connection with retry on expired credentials
//!
//! A [`Connection`] owns one transport, one trust policy, one proxy router and
//! exactly one authentication strategy. Requests that come back with 401 are
//! replayed after the connection re-establishes its credentials, at most
//! [`MAX_AUTH_RETRIES`] times per logical request.

use super::request::{build_url, merge_headers, set_header, RequestBody, RequestDescriptor};
use crate::auth::{AuthContext, AuthStrategy, ChallengeOutcome};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::proxy::ProxyRouter;
use crate::trust::{Certificate, TrustPolicy};
use crate::types::{is_sensitive_header, HeaderPairs, JsonValue};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace, warn};
use url::Url;

/// Replays allowed per logical request after a 401
pub const MAX_AUTH_RETRIES: u32 = 2;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport yet
    Unconnected,
    /// Building the transport and authenticating
    Connecting,
    /// Ready for requests
    Connected,
    /// Re-establishing credentials after a 401
    Reauthenticating,
    /// Unusable until `connect()` succeeds
    Failed,
}

/// Authenticated connection to the backend
pub struct Connection {
    config: ConnectionConfig,
    base_url: Url,
    strategy: Arc<dyn AuthStrategy>,
    router: ProxyRouter,
    trust: TrustPolicy,
    common_headers: RwLock<HeaderPairs>,
    transport: RwLock<Option<Client>>,
    state: RwLock<ConnectionState>,
    generation: AtomicU64,
    connect_lock: Mutex<()>,
}

impl Connection {
    /// Create a connection using the strategy selected by `config.auth`
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let strategy = config.auth.clone().into_strategy();
        Self::with_strategy(config, strategy)
    }

    /// Create a connection with an explicit strategy
    pub fn with_strategy(config: ConnectionConfig, strategy: Arc<dyn AuthStrategy>) -> Result<Self> {
        let base_url = config.validate()?;
        let router = ProxyRouter::new(config.proxy.clone())?;
        let trust = TrustPolicy::new(
            config.always_trust_server_certificate,
            config.trust_store.clone(),
        );

        let mut common_headers = Vec::new();
        for (name, value) in &config.common_headers {
            set_header(&mut common_headers, name.clone(), value.clone());
        }

        Ok(Self {
            config,
            base_url,
            strategy,
            router,
            trust,
            common_headers: RwLock::new(common_headers),
            transport: RwLock::new(None),
            state: RwLock::new(ConnectionState::Unconnected),
            generation: AtomicU64::new(0),
            connect_lock: Mutex::new(()),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Base URL of the backend
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Settings this connection was built from
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Active authentication strategy
    pub fn strategy(&self) -> &Arc<dyn AuthStrategy> {
        &self.strategy
    }

    /// Trust policy of this connection
    pub fn trust(&self) -> &TrustPolicy {
        &self.trust
    }

    /// Proxy router of this connection
    pub fn router(&self) -> &ProxyRouter {
        &self.router
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Headers sent with every request
    pub async fn common_headers(&self) -> HeaderPairs {
        self.common_headers.read().await.clone()
    }

    /// Add or replace a header sent with every request
    pub async fn add_common_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut headers = self.common_headers.write().await;
        set_header(&mut headers, name.into(), value.into());
    }

    /// Stop sending a common header
    pub async fn remove_common_header(&self, name: &str) -> Option<String> {
        let mut headers = self.common_headers.write().await;
        let position = headers
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(headers.remove(position).1)
    }

    /// Build a URL below `base` (or the base URL) with encoded query parameters
    pub fn build_url<S: AsRef<str>>(
        &self,
        base: Option<&str>,
        segments: &[S],
        query: &BTreeMap<String, String>,
    ) -> Result<Url> {
        build_url(base.unwrap_or(self.base_url.as_str()), segments, query)
    }

    // ========================================================================
    // Server Certificates
    // ========================================================================

    /// Fetch the certificate the backend presents
    ///
    /// Uses this connection's proxy routing and timeout.
    pub async fn retrieve_server_certificate(&self) -> Result<Certificate> {
        self.trust
            .retrieve_certificate(&self.base_url, &self.router, self.config.timeout)
            .await
    }

    /// Fetch the backend certificate and import it into the trust store
    pub async fn import_server_certificate(&self) -> Result<()> {
        self.trust
            .retrieve_and_import(&self.base_url, &self.router, self.config.timeout)
            .await
    }

    // ========================================================================
    // Connecting
    // ========================================================================

    /// Build the transport and authenticate
    ///
    /// Calls are serialized; a successful connect also recovers a failed
    /// connection.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        self.connect_locked(ConnectionState::Connecting, ConnectionState::Failed)
            .await
    }

    /// Establish credentials, moving to `on_error` when that fails
    async fn connect_locked(
        &self,
        during: ConnectionState,
        on_error: ConnectionState,
    ) -> Result<()> {
        self.set_state(during).await;
        match self.establish().await {
            Ok(()) => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                self.set_state(ConnectionState::Connected).await;
                debug!(base_url = %self.base_url, kind = %self.strategy.kind(), "Connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(on_error).await;
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<()> {
        self.strategy.prepare()?;
        let client = self.build_transport()?;
        *self.transport.write().await = Some(client.clone());

        let ctx = AuthContext::new(client, self.base_url.clone());
        self.strategy.authenticate(&ctx).await
    }

    fn build_transport(&self) -> Result<Client> {
        let builder = Client::builder()
            .connect_timeout(self.config.timeout)
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent);
        let builder = self.router.configure(builder, &self.base_url)?;
        let builder = self.trust.configure(builder, &self.base_url)?;
        let builder = self.strategy.configure(builder);
        Ok(builder.build()?)
    }

    /// Re-establish credentials unless another task already did
    ///
    /// A failure leaves the connection usable; the caller decides whether the
    /// retry budget is spent.
    async fn reauthenticate(&self, seen_generation: u64) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.generation.load(Ordering::SeqCst) != seen_generation {
            debug!("Credentials already refreshed by a concurrent request");
            return Ok(());
        }
        self.connect_locked(
            ConnectionState::Reauthenticating,
            ConnectionState::Connected,
        )
        .await
    }

    async fn ensure_connected(&self) -> Result<()> {
        match self.state().await {
            ConnectionState::Connected | ConnectionState::Reauthenticating => Ok(()),
            ConnectionState::Failed => Err(failed()),
            ConnectionState::Unconnected | ConnectionState::Connecting => {
                let _guard = self.connect_lock.lock().await;
                match self.state().await {
                    ConnectionState::Unconnected => {
                        self.connect_locked(ConnectionState::Connecting, ConnectionState::Failed)
                            .await
                    }
                    ConnectionState::Failed => Err(failed()),
                    _ => Ok(()),
                }
            }
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn client(&self) -> Result<Client> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::connection_failed("no transport available"))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute a request
    ///
    /// Connects lazily. A 401 re-establishes credentials and replays the
    /// request; any other non-2xx answer becomes `Error::HttpStatus` after its
    /// body has been released.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Response> {
        self.ensure_connected().await?;

        let mut auth_retries = 0u32;
        let mut proxy_answer: Option<(String, String)> = None;
        let mut last_auth_error: Option<Error> = None;

        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            let client = self.client().await?;
            let ctx = AuthContext::new(client.clone(), self.base_url.clone());

            let mut decorated = self.strategy.decorate(&ctx, request).await?;
            if let Some(answer) = &proxy_answer {
                decorated = decorated.rebuild(std::slice::from_ref(answer));
            }
            let wire = self.wire_request(&client, &decorated).await?;
            let method = wire.method().clone();
            let url = wire.url().clone();

            if tracing::enabled!(tracing::Level::TRACE) {
                let headers: Vec<(String, String)> = wire
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        let shown = if is_sensitive_header(name.as_str()) {
                            "[REDACTED]".to_string()
                        } else {
                            value.to_str().unwrap_or("<binary>").to_string()
                        };
                        (name.to_string(), shown)
                    })
                    .collect();
                trace!(%method, %url, ?headers, "Sending request");
            }

            let started = Instant::now();
            let response = match client.execute(wire).await {
                Ok(response) => response,
                Err(e) => {
                    self.set_state(ConnectionState::Failed).await;
                    return Err(e.into());
                }
            };
            let status = response.status();
            trace!(
                %method,
                %url,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request completed"
            );

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
                if let Some(answer) = self.router.challenge_response(
                    status,
                    response.headers(),
                    proxy_answer.is_some(),
                ) {
                    drop(response);
                    debug!(%url, "Answering proxy authentication challenge");
                    proxy_answer = Some(answer);
                    continue;
                }
            }

            if status == StatusCode::UNAUTHORIZED
                && auth_retries < MAX_AUTH_RETRIES
                && self.strategy.on_unauthorized(auth_retries) == ChallengeOutcome::Reauthenticate
            {
                drop(response);
                auth_retries += 1;
                warn!(
                    %method,
                    %url,
                    attempt = auth_retries,
                    max = MAX_AUTH_RETRIES,
                    "Unauthorized, re-establishing credentials"
                );
                if let Err(e) = self.reauthenticate(generation).await {
                    warn!(error = %e, "Re-authentication failed");
                    last_auth_error = Some(e);
                }
                continue;
            }

            let error = Error::http_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                method.as_str(),
                url.as_str(),
            );
            drop(response);

            if status == StatusCode::UNAUTHORIZED && auth_retries > 0 {
                self.set_state(ConnectionState::Failed).await;
                return Err(last_auth_error.unwrap_or(error));
            }
            return Err(error);
        }
    }

    async fn wire_request(
        &self,
        client: &Client,
        request: &RequestDescriptor,
    ) -> Result<reqwest::Request> {
        let url = self.build_url(request.url.as_deref(), &request.segments, &request.query)?;
        let common = self.common_headers.read().await.clone();
        let headers = merge_headers([common.as_slice(), request.headers.as_slice()]);

        let mut builder = client.request(request.method.clone(), url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            None => builder,
            Some(RequestBody::Json(body)) => builder.json(body),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Text {
                content_type,
                content,
            }) => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(content.clone()),
        };
        Ok(builder.build()?)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Execute and decode a JSON answer
    pub async fn get_json<T: DeserializeOwned>(&self, request: &RequestDescriptor) -> Result<T> {
        let response = self.execute(request).await?;
        Ok(response.json::<T>().await?)
    }

    /// Execute and read the answer as text
    pub async fn get_string(&self, request: &RequestDescriptor) -> Result<String> {
        let response = self.execute(request).await?;
        Ok(response.text().await?)
    }

    /// Execute `request` with a JSON body
    pub async fn send_json(&self, request: &RequestDescriptor, body: JsonValue) -> Result<Response> {
        let request = request.clone().json(body);
        self.execute(&request).await
    }

    /// Execute `request` with a form body
    pub async fn send_form(
        &self,
        request: &RequestDescriptor,
        fields: Vec<(String, String)>,
    ) -> Result<Response> {
        let request = request.clone().form(fields);
        self.execute(&request).await
    }

    /// Execute `request` as a DELETE, discarding the answer body
    pub async fn delete(&self, request: &RequestDescriptor) -> Result<()> {
        let mut request = request.clone();
        request.method = Method::DELETE;
        self.execute(&request).await.map(drop)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url.as_str())
            .field("strategy", &self.strategy)
            .field("router", &self.router)
            .field("trust", &self.trust)
            .finish_non_exhaustive()
    }
}

fn failed() -> Error {
    Error::connection_failed("connection is in a failed state")
}
