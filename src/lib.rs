// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # hub-rest
//!
//! Authenticated REST connection core for a single backend service.
//!
//! ## Features
//!
//! - **Certificate Trust**: Always-trust mode or a password-sealed trust store
//! - **Multiple Auth Types**: Session cookie, API Key, Bearer Token, OAuth2
//! - **Proxy Routing**: Per-host exclusion patterns and Basic proxy challenges
//! - **Retry on 401**: Credentials are re-established and the request replayed
//! - **Pagination**: Offset/limit collections aggregated into one result set
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hub_rest::{AuthConfig, Connection, ConnectionConfig, PagedRequest, RequestDescriptor};
//! use hub_rest::pagination::PaginationAggregator;
//!
//! # async fn run() -> hub_rest::Result<()> {
//! let config = ConnectionConfig::builder()
//!     .base_url("https://hub.example.com")
//!     .auth(AuthConfig::ApiKey {
//!         api_key: "my-key".to_string(),
//!         token_path: None,
//!     })
//!     .build();
//! let connection = Connection::new(config)?;
//!
//! let request = PagedRequest::new(RequestDescriptor::get().segments(["api", "projects"]));
//! let projects: Vec<serde_json::Value> = PaginationAggregator::new(&connection)
//!     .fetch_all_as(&request)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaginationAggregator                     │
//! │        fetch_all(paged_request, decode) → Vec<T>            │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//! ┌─────────────────────────────┴───────────────────────────────┐
//! │                         Connection                          │
//! │   connect()   execute(request) → Response   retry on 401    │
//! └─────────────────────────────────────────────────────────────┘
//!            │                  │                    │
//! ┌──────────┴─────┬────────────┴───────┬────────────┴─────────┐
//! │     Trust      │       Proxy        │         Auth         │
//! ├────────────────┼────────────────────┼──────────────────────┤
//! │ Always trust   │ Host exclusions    │ Session              │
//! │ Trust store    │ Basic challenge    │ API Key              │
//! │ Import/remove  │                    │ Bearer Token, OAuth2 │
//! └────────────────┴────────────────────┴──────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Connection configuration
pub mod config;

/// Server certificate trust
pub mod trust;

/// Proxy routing
pub mod proxy;

/// Authentication strategies
pub mod auth;

/// Authenticated connection and request descriptors
pub mod http;

/// Paged collection aggregation
pub mod pagination;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorCategory, Result};

// Re-export commonly used types
pub use auth::{AuthConfig, AuthStrategy};
pub use config::ConnectionConfig;
pub use http::{Connection, ConnectionState, RequestDescriptor};
pub use pagination::{PagedRequest, PagedResponse, PaginationAggregator};
pub use proxy::ProxyConfig;
pub use trust::{TrustPolicy, TrustStoreConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
