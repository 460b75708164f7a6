//! File-backed certificate trust store
//!
//! The store maps hostnames to DER certificates and is persisted as a JSON
//! document sealed with an HMAC-SHA256 keyed by the store password. Writes go
//! to a uniquely named temp file first and are renamed into place.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Current on-disk format version
const STORE_VERSION: u32 = 1;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

// ============================================================================
// Certificate
// ============================================================================

/// An X.509 certificate in DER form
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wrap DER bytes
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self { der: der.into() }
    }

    /// Parse a base64 encoded DER certificate
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::trust(format!("Invalid base64 certificate: {e}")))?;
        Ok(Self { der })
    }

    /// Parse the first certificate of a PEM document
    pub fn from_pem(pem: &str) -> Result<Self> {
        let start = pem
            .find(PEM_BEGIN)
            .ok_or_else(|| Error::trust("No PEM certificate block found"))?
            + PEM_BEGIN.len();
        let end = pem[start..]
            .find(PEM_END)
            .ok_or_else(|| Error::trust("Unterminated PEM certificate block"))?
            + start;
        let body: String = pem[start..end]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        Self::from_base64(&body)
    }

    /// Raw DER bytes
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Base64 encoding of the DER bytes
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.der)
    }

    /// PEM encoding with 64 character lines
    pub fn to_pem(&self) -> String {
        let encoded = self.to_base64();
        let mut pem = String::with_capacity(encoded.len() + 64);
        pem.push_str(PEM_BEGIN);
        pem.push('\n');
        for chunk in encoded.as_bytes().chunks(64) {
            pem.push_str(&String::from_utf8_lossy(chunk));
            pem.push('\n');
        }
        pem.push_str(PEM_END);
        pem.push('\n');
        pem
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("der_len", &self.der.len())
            .finish()
    }
}

// ============================================================================
// Trust Store
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
    mac: String,
}

/// Hostname to certificate map persisted on disk
pub struct TrustStore {
    path: PathBuf,
    password: String,
    entries: BTreeMap<String, Certificate>,
}

impl TrustStore {
    /// Load the store at `path`
    ///
    /// A missing or zero-length file is replaced by a new, empty store which
    /// is written immediately. A non-empty file that cannot be parsed, or
    /// whose seal does not match `password`, is a `TrustStore` error.
    pub fn load(path: impl AsRef<Path>, password: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let is_empty = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(store_error(&path, format!("Failed to stat: {e}"))),
        };

        if is_empty {
            debug!(path = %path.display(), "Creating empty trust store");
            let store = Self {
                path,
                password: password.to_string(),
                entries: BTreeMap::new(),
            };
            store.save()?;
            return Ok(store);
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| store_error(&path, format!("Failed to read: {e}")))?;
        let file: StoreFile = serde_json::from_str(&contents)
            .map_err(|e| store_error(&path, format!("Corrupt trust store: {e}")))?;

        if file.version != STORE_VERSION {
            return Err(store_error(
                &path,
                format!("Unsupported trust store version {}", file.version),
            ));
        }

        let expected = hex::decode(&file.mac)
            .map_err(|e| store_error(&path, format!("Corrupt seal: {e}")))?;
        let mut mac = new_mac(&path, password)?;
        mac.update(&canonical_bytes(&path, &file.entries)?);
        mac.verify_slice(&expected).map_err(|_| {
            store_error(
                &path,
                "Keystore was tampered with, or password was incorrect",
            )
        })?;

        let mut entries = BTreeMap::new();
        for (host, encoded) in file.entries {
            let cert = Certificate::from_base64(&encoded)
                .map_err(|e| store_error(&path, format!("Bad entry for {host}: {e}")))?;
            entries.insert(host, cert);
        }

        Ok(Self {
            path,
            password: password.to_string(),
            entries,
        })
    }

    /// Persist the store atomically
    pub fn save(&self) -> Result<()> {
        let encoded: BTreeMap<String, String> = self
            .entries
            .iter()
            .map(|(host, cert)| (host.clone(), cert.to_base64()))
            .collect();

        let mut mac = new_mac(&self.path, &self.password)?;
        mac.update(&canonical_bytes(&self.path, &encoded)?);
        let file = StoreFile {
            version: STORE_VERSION,
            entries: encoded,
            mac: hex::encode(mac.finalize().into_bytes()),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)
            .map_err(|e| store_error(&self.path, format!("Failed to create directory: {e}")))?;

        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| store_error(&self.path, format!("Failed to create temp file: {e}")))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| store_error(&self.path, format!("Failed to write: {e}")))?;
        temp.persist(&self.path)
            .map_err(|e| store_error(&self.path, format!("Failed to rename: {}", e.error)))?;
        Ok(())
    }

    /// Location of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check whether a certificate is stored for `host`
    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    /// Certificate stored for `host`
    pub fn get(&self, host: &str) -> Option<&Certificate> {
        self.entries.get(host)
    }

    /// Store `cert` for `host`, replacing any previous certificate
    pub fn insert(&mut self, host: impl Into<String>, cert: Certificate) -> Option<Certificate> {
        self.entries.insert(host.into(), cert)
    }

    /// Drop the certificate stored for `host`
    pub fn remove(&mut self, host: &str) -> Option<Certificate> {
        self.entries.remove(host)
    }

    /// All stored certificates, ordered by hostname
    pub fn certificates(&self) -> impl Iterator<Item = (&str, &Certificate)> {
        self.entries.iter().map(|(host, cert)| (host.as_str(), cert))
    }

    /// Number of stored certificates
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no certificate
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("path", &self.path)
            .field("hosts", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn new_mac(path: &Path, password: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(password.as_bytes())
        .map_err(|e| store_error(path, format!("Unusable password: {e}")))
}

fn canonical_bytes(path: &Path, entries: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    serde_json::to_vec(entries).map_err(|e| store_error(path, format!("Failed to encode: {e}")))
}

fn store_error(path: &Path, message: impl Into<String>) -> Error {
    Error::trust_store(path.display().to_string(), message)
}
