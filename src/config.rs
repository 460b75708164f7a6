//! Connection configuration
//!
//! Settings are plain data, deserializable from YAML, and validated once
//! before a connection is built. Nothing here reads the environment; use
//! [`TrustStoreConfig::from_env`] at startup for the trust store settings.

use crate::auth::AuthConfig;
use crate::error::{Error, Result, ResultExt};
use crate::proxy::{compile_patterns, ProxyConfig};
use crate::trust::TrustStoreConfig;
use crate::types::StringMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default connect and request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Connection Config
// ============================================================================

/// Everything needed to open a connection to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionConfig {
    /// Base URL of the backend
    #[serde(default)]
    pub base_url: String,

    /// Connect and request timeout
    #[serde(
        rename = "timeout_seconds",
        default = "default_timeout",
        with = "duration_secs"
    )]
    pub timeout: Duration,

    /// Proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Accept any server certificate
    #[serde(default)]
    pub always_trust_server_certificate: bool,

    /// Trust store location and password
    #[serde(default)]
    pub trust_store: TrustStoreConfig,

    /// Headers sent with every request
    #[serde(default)]
    pub common_headers: StringMap,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Authentication strategy
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_user_agent() -> String {
    format!("hub-rest/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            proxy: ProxyConfig::none(),
            always_trust_server_certificate: false,
            trust_store: TrustStoreConfig::default(),
            common_headers: StringMap::new(),
            user_agent: default_user_agent(),
            auth: AuthConfig::None,
        }
    }
}

impl ConnectionConfig {
    /// Create a new config builder
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&contents)
    }

    /// Check the settings without touching the network
    pub fn validate(&self) -> Result<Url> {
        if self.base_url.trim().is_empty() {
            return Err(Error::missing_field("base_url"));
        }
        let url = Url::parse(self.base_url.trim())
            .map_err(|e| Error::invalid_value("base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_value(
                "base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.cannot_be_a_base() {
            return Err(Error::invalid_value("base_url", "not a base URL"));
        }

        if self.timeout.is_zero() {
            return Err(Error::invalid_value("timeout", "must be greater than zero"));
        }

        let proxy = &self.proxy;
        let has_host = !proxy.host.trim().is_empty();
        if has_host != (proxy.port > 0) {
            return Err(Error::invalid_value(
                "proxy",
                "host and port must be configured together",
            ));
        }
        if proxy.has_credentials() && !proxy.is_configured() {
            return Err(Error::invalid_value(
                "proxy",
                "credentials given without a proxy host",
            ));
        }
        compile_patterns(&proxy.exclusions)?;

        Ok(url)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ConnectionConfig`]
#[derive(Default)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the proxy
    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = proxy;
        self
    }

    /// Accept any server certificate
    pub fn always_trust_server_certificate(mut self, always: bool) -> Self {
        self.config.always_trust_server_certificate = always;
        self
    }

    /// Set the trust store
    pub fn trust_store(mut self, trust_store: TrustStoreConfig) -> Self {
        self.config.trust_store = trust_store;
        self
    }

    /// Add a common header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .common_headers
            .insert(name.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Set the authentication strategy
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    /// Build the config
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessType, AuthKind};
    use crate::error::ErrorCategory;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert!(!config.always_trust_server_certificate);
        assert!(!config.proxy.is_configured());
        assert!(config.user_agent.starts_with("hub-rest/"));
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::builder()
            .base_url("https://hub.example.com")
            .timeout(Duration::from_secs(30))
            .header("X-Client", "tests")
            .auth(AuthConfig::ApiKey {
                api_key: "k".to_string(),
                token_path: None,
            })
            .build();

        assert_eq!(config.base_url, "https://hub.example.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.common_headers.get("X-Client").map(String::as_str),
            Some("tests")
        );
        assert_eq!(config.auth.kind(), AuthKind::ApiKey);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
base_url: https://hub.example.com/
timeout_seconds: 45
always_trust_server_certificate: true
proxy:
  host: proxy.local
  port: 3128
  exclusions: ["localhost", "*.internal.net"]
auth:
  type: oauth2
  access_type: user
  configuration:
    token_uri: https://auth.example.com/token
    client_id: hub
    refresh_token: r1
"#;
        let config = ConnectionConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert!(config.always_trust_server_certificate);
        assert_eq!(config.proxy.port, 3128);
        assert_eq!(config.proxy.exclusions.len(), 2);
        match &config.auth {
            AuthConfig::OAuth2 {
                configuration,
                access_type,
            } => {
                assert_eq!(*access_type, AccessType::User);
                assert_eq!(configuration.refresh_token.as_deref(), Some("r1"));
            }
            other => panic!("unexpected auth {other:?}"),
        }
        assert_eq!(config.validate().unwrap().as_str(), "https://hub.example.com/");
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.yaml");
        std::fs::write(&path, "base_url: http://localhost:8080\n").unwrap();

        let config = ConnectionConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);

        let missing = ConnectionConfig::from_yaml_file(dir.path().join("nope.yaml"));
        let err = missing.unwrap_err();
        assert!(err.to_string().contains("nope.yaml"));
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ConnectionConfig::from_yaml_str("base_url: [unclosed").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test_case("" ; "missing")]
    #[test_case("not a url" ; "unparseable")]
    #[test_case("ftp://hub.example.com" ; "wrong scheme")]
    #[test_case("mailto:admin@example.com" ; "not a base")]
    fn test_invalid_base_url(base_url: &str) {
        let config = ConnectionConfig::builder().base_url(base_url).build();
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ConnectionConfig::builder()
            .base_url("https://hub.example.com")
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfigValue { .. })
        ));
    }

    #[test_case(ProxyConfig::new("proxy.local", 0) ; "host without port")]
    #[test_case(ProxyConfig::new("", 3128) ; "port without host")]
    #[test_case(ProxyConfig::none().credentials("u", "p") ; "credentials without proxy")]
    fn test_half_configured_proxy_rejected(proxy: ProxyConfig) {
        let config = ConnectionConfig::builder()
            .base_url("https://hub.example.com")
            .proxy(proxy)
            .build();
        assert!(config.validate().is_err());
    }
}
