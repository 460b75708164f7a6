//! Certificate trust module
//!
//! Decides whether a server certificate is accepted and manages the
//! password-protected store of imported certificates.
//!
//! # Example
//!
//! ```rust,no_run
//! use hub_rest::trust::{TrustPolicy, TrustStoreConfig};
//!
//! let policy = TrustPolicy::new(false, TrustStoreConfig::from_env());
//! if !policy.is_trusted("hub.example.com")? {
//!     // import the certificate, or ask the user first
//! }
//! # Ok::<(), hub_rest::Error>(())
//! ```

mod policy;
mod store;

pub use policy::{
    TrustPolicy, TrustStoreConfig, DEFAULT_TRUSTSTORE_PASSWORD, HOME_ENV, TRUSTSTORE_ENV,
    TRUSTSTORE_PASSWORD_ENV,
};
pub use store::{Certificate, TrustStore};
