//! Trust decisions for server certificates
//!
//! Decides whether a connection accepts any server certificate or validates
//! against the system roots plus the certificates imported into the trust
//! store, and manages that store.

use super::store::{Certificate, TrustStore};
use crate::error::{Error, Result};
use crate::proxy::ProxyRouter;
use reqwest::ClientBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Environment variable naming an explicit trust store file
pub const TRUSTSTORE_ENV: &str = "HUB_REST_TRUSTSTORE";

/// Environment variable holding the trust store password
pub const TRUSTSTORE_PASSWORD_ENV: &str = "HUB_REST_TRUSTSTORE_PASSWORD";

/// Environment variable naming the installation home directory
pub const HOME_ENV: &str = "HUB_REST_HOME";

/// Password used when none is configured
pub const DEFAULT_TRUSTSTORE_PASSWORD: &str = "changeit";

// ============================================================================
// Trust Store Configuration
// ============================================================================

/// Where the trust store lives and how it is sealed
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrustStoreConfig {
    /// Explicit store file
    pub path: Option<PathBuf>,
    /// Installation home; the store is looked up under `lib/security`
    pub home: Option<PathBuf>,
    /// Store password
    pub password: String,
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            home: None,
            password: DEFAULT_TRUSTSTORE_PASSWORD.to_string(),
        }
    }
}

impl std::fmt::Debug for TrustStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStoreConfig")
            .field("path", &self.path)
            .field("home", &self.home)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl TrustStoreConfig {
    /// Read the trust store settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            path: non_blank(TRUSTSTORE_ENV).map(PathBuf::from),
            home: non_blank(HOME_ENV).map(PathBuf::from),
            password: non_blank(TRUSTSTORE_PASSWORD_ENV)
                .unwrap_or_else(|| DEFAULT_TRUSTSTORE_PASSWORD.to_string()),
        }
    }

    /// Resolve the store file
    ///
    /// An explicit path wins when it names an existing file. Otherwise the
    /// home directory provides `lib/security/jssecacerts` if present, else
    /// `lib/security/cacerts`. Without a home the explicit path is used even
    /// if it does not exist yet.
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            if path.is_file() || self.home.is_none() {
                return Ok(path.clone());
            }
        }

        let home = self
            .home
            .as_ref()
            .ok_or_else(|| Error::trust("No trust store path or home directory configured"))?;
        let security = home.join("lib").join("security");
        let jssecacerts = security.join("jssecacerts");
        if jssecacerts.is_file() {
            Ok(jssecacerts)
        } else {
            Ok(security.join("cacerts"))
        }
    }
}

// ============================================================================
// Trust Policy
// ============================================================================

/// Trust mode of one connection plus access to its trust store
///
/// Clones share one write lock, so store mutations made through any clone
/// never overwrite each other.
#[derive(Debug, Clone)]
pub struct TrustPolicy {
    always_trust: bool,
    store: TrustStoreConfig,
    write_lock: Arc<Mutex<()>>,
}

impl TrustPolicy {
    /// Create a policy
    pub fn new(always_trust: bool, store: TrustStoreConfig) -> Self {
        Self {
            always_trust,
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whether any server certificate is accepted
    pub fn should_auto_trust(&self) -> bool {
        self.always_trust
    }

    /// Trust store settings
    pub fn store_config(&self) -> &TrustStoreConfig {
        &self.store
    }

    /// Load (or create) the trust store
    pub fn load_trust_store(&self) -> Result<TrustStore> {
        let path = self.store.resolve()?;
        TrustStore::load(path, &self.store.password)
    }

    /// Whether a certificate is stored for `host`
    pub fn is_trusted(&self, host: &str) -> Result<bool> {
        Ok(self.load_trust_store()?.contains(host))
    }

    /// Certificate stored for `host`
    pub fn certificate_for(&self, host: &str) -> Result<Option<Certificate>> {
        Ok(self.load_trust_store()?.get(host).cloned())
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::trust("Trust store lock poisoned"))
    }

    /// Store `cert` for `host`, replacing any previous one
    pub fn import_certificate(&self, host: &str, cert: Certificate) -> Result<()> {
        let _guard = self.lock_store()?;
        let mut store = self.load_trust_store()?;
        store.insert(host, cert);
        store.save()?;
        info!(host, path = %store.path().display(), "Imported server certificate");
        Ok(())
    }

    /// Forget the certificate stored for `host`
    pub fn remove_certificate(&self, host: &str) -> Result<()> {
        let _guard = self.lock_store()?;
        let mut store = self.load_trust_store()?;
        if store.remove(host).is_some() {
            store.save()?;
            info!(host, path = %store.path().display(), "Removed server certificate");
        }
        Ok(())
    }

    /// Fetch the leaf certificate presented by an https server
    ///
    /// Performs a throwaway handshake that accepts any certificate. The
    /// handshake goes through `router` like every other request and is bound
    /// by `timeout`.
    pub async fn retrieve_certificate(
        &self,
        url: &Url,
        router: &ProxyRouter,
        timeout: Duration,
    ) -> Result<Certificate> {
        if url.scheme() != "https" {
            return Err(Error::trust(format!(
                "Cannot retrieve a certificate from non-https URL {url}"
            )));
        }

        let builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .tls_info(true)
            .connect_timeout(timeout)
            .timeout(timeout);
        let client = router.configure(builder, url)?.build()?;
        let response = client.head(url.clone()).send().await?;

        let der = response
            .extensions()
            .get::<reqwest::tls::TlsInfo>()
            .and_then(|info| info.peer_certificate())
            .ok_or_else(|| Error::trust(format!("Server {url} presented no certificate")))?;
        Ok(Certificate::from_der(der))
    }

    /// Retrieve the server certificate of `url` and import it for its host
    ///
    /// Non-https URLs are ignored.
    pub async fn retrieve_and_import(
        &self,
        url: &Url,
        router: &ProxyRouter,
        timeout: Duration,
    ) -> Result<()> {
        if url.scheme() != "https" {
            debug!(%url, "Skipping certificate import for non-https URL");
            return Ok(());
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::trust(format!("URL {url} has no host")))?;
        let cert = self.retrieve_certificate(url, router, timeout).await?;
        self.import_certificate(host, cert)
    }

    /// Apply the trust mode to a transport builder for `target`
    pub fn configure(&self, builder: ClientBuilder, target: &Url) -> Result<ClientBuilder> {
        if target.scheme() != "https" {
            return Ok(builder);
        }

        if self.always_trust {
            warn!(
                host = target.host_str().unwrap_or_default(),
                "Automatically trusting the server certificate"
            );
            return Ok(builder.danger_accept_invalid_certs(true));
        }

        let path = match self.store.resolve() {
            Ok(path) => path,
            Err(_) => return Ok(builder),
        };
        if !store_present(&path) {
            return Ok(builder);
        }

        let store = TrustStore::load(&path, &self.store.password)?;
        let mut builder = builder;
        for (host, cert) in store.certificates() {
            let root = reqwest::Certificate::from_der(cert.der()).map_err(|e| {
                Error::trust_store(
                    path.display().to_string(),
                    format!("Certificate for {host} is not usable: {e}"),
                )
            })?;
            builder = builder.add_root_certificate(root);
        }
        debug!(certificates = store.len(), "Added trust store certificates");
        Ok(builder)
    }
}

fn store_present(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}
