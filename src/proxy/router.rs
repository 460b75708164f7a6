//! Proxy routing decisions and proxy authentication

use crate::error::{Error, Result};
use crate::types::{PROXY_AUTHENTICATE, PROXY_AUTHORIZATION};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::{ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

// ============================================================================
// Configuration
// ============================================================================

/// Proxy settings of a connection
///
/// An empty host or a zero port means no proxy is used at all.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Username for proxy authentication
    pub username: Option<String>,
    /// Password for proxy authentication
    pub password: Option<String>,
    /// Hostname patterns that bypass the proxy
    pub exclusions: Vec<String>,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("exclusions", &self.exclusions)
            .finish()
    }
}

impl ProxyConfig {
    /// The "no proxy" rule
    pub fn none() -> Self {
        Self::default()
    }

    /// Proxy at `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Set proxy credentials
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set exclusion patterns
    #[must_use]
    pub fn exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a proxy host and port are both present
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && self.port > 0
    }

    /// Whether a username is present
    pub fn has_credentials(&self) -> bool {
        self.username
            .as_deref()
            .is_some_and(|user| !user.trim().is_empty())
    }

    /// Split a comma separated pattern list, dropping blank entries
    pub fn parse_exclusions(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Compile exclusion patterns
///
/// Each pattern is a regex searched anywhere in the hostname. A pattern that
/// is not a valid regex is read as a glob where `*` matches anything.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).or_else(|_| {
                Regex::new(&glob_to_regex(pattern)).map_err(|e| {
                    Error::invalid_value(
                        "proxy.exclusions",
                        format!("Invalid pattern '{pattern}': {e}"),
                    )
                })
            })
        })
        .collect()
}

fn glob_to_regex(glob: &str) -> String {
    let escaped: Vec<String> = glob.split('*').map(regex::escape).collect();
    format!("^{}$", escaped.join(".*"))
}

// ============================================================================
// Routing
// ============================================================================

/// Outcome of routing one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDecision {
    /// Whether the request goes through the proxy
    pub use_proxy: bool,
    /// Proxy host (empty when not proxied)
    pub proxy_host: String,
    /// Proxy port (zero when not proxied)
    pub proxy_port: u16,
}

impl ProxyDecision {
    /// Direct connection
    pub fn direct() -> Self {
        Self {
            use_proxy: false,
            proxy_host: String::new(),
            proxy_port: 0,
        }
    }
}

/// Decides per URL whether the configured proxy is used
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    config: ProxyConfig,
    patterns: Vec<Regex>,
}

impl ProxyRouter {
    /// Create a router, compiling the exclusion patterns
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let patterns = compile_patterns(&config.exclusions)?;
        Ok(Self { config, patterns })
    }

    /// Router that never proxies
    pub fn direct() -> Self {
        Self {
            config: ProxyConfig::none(),
            patterns: Vec::new(),
        }
    }

    /// Proxy settings
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Route one URL
    pub fn route(&self, url: &Url) -> ProxyDecision {
        if !self.config.is_configured() {
            return ProxyDecision::direct();
        }
        let Some(host) = url.host_str() else {
            return ProxyDecision::direct();
        };
        if Self::should_exclude(host, &self.patterns) {
            return ProxyDecision::direct();
        }
        ProxyDecision {
            use_proxy: true,
            proxy_host: self.config.host.clone(),
            proxy_port: self.config.port,
        }
    }

    /// Whether `host` matches any exclusion pattern
    pub fn should_exclude(host: &str, patterns: &[Regex]) -> bool {
        patterns.iter().any(|pattern| pattern.is_match(host))
    }

    /// Answer a proxy authentication challenge
    ///
    /// Returns the `Proxy-Authorization` header for a 407 that offers Basic
    /// when credentials are configured. A request that already answered a
    /// challenge gets `None`, which ends the exchange.
    ///
    /// Only 407 is answered. A 401 comes from the backend and is handled by
    /// the connection's authentication strategy, so proxy credentials are
    /// never sent to the backend as `Authorization`.
    pub fn challenge_response(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        already_challenged: bool,
    ) -> Option<(String, String)> {
        if status != StatusCode::PROXY_AUTHENTICATION_REQUIRED || already_challenged {
            return None;
        }
        if !self.config.has_credentials() {
            return None;
        }
        let offers_basic = headers
            .get_all(PROXY_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| {
                value
                    .split_whitespace()
                    .next()
                    .is_some_and(|scheme| scheme.eq_ignore_ascii_case("basic"))
            });
        if !offers_basic {
            return None;
        }

        let username = self.config.username.as_deref().unwrap_or_default();
        let password = self.config.password.as_deref().unwrap_or_default();
        let encoded = STANDARD.encode(format!("{username}:{password}"));
        Some((PROXY_AUTHORIZATION.to_string(), format!("Basic {encoded}")))
    }

    /// Install the routing function on a transport builder
    ///
    /// Credentials are attached to the proxy up front only for https base
    /// URLs, where the tunnel hides the 407 from the caller.
    pub fn configure(&self, builder: ClientBuilder, base_url: &Url) -> Result<ClientBuilder> {
        if !self.config.is_configured() {
            return Ok(builder.no_proxy());
        }

        let proxy_url = Url::parse(&format!(
            "http://{}:{}",
            self.config.host.trim(),
            self.config.port
        ))
        .map_err(|e| Error::invalid_value("proxy.host", e.to_string()))?;
        debug!(proxy = %proxy_url, "Routing requests through proxy");

        let router = self.clone();
        let mut proxy = reqwest::Proxy::custom(move |url| {
            router.route(url).use_proxy.then(|| proxy_url.clone())
        });

        if base_url.scheme() == "https" && self.config.has_credentials() {
            proxy = proxy.basic_auth(
                self.config.username.as_deref().unwrap_or_default(),
                self.config.password.as_deref().unwrap_or_default(),
            );
        }

        Ok(builder.proxy(proxy))
    }
}
