//! HTTP connection module
//!
//! Provides the authenticated [`Connection`] and the request descriptors it
//! executes.
//!
//! # Features
//!
//! - **Lazy connect**: the transport is built on first use or by `connect()`
//! - **Retry on 401**: credentials are re-established and the request replayed
//! - **Proxy challenges**: Basic 407 challenges are answered once per request
//! - **URL building**: path segments and percent-encoded query parameters

mod connection;
mod request;

pub use connection::{Connection, ConnectionState, MAX_AUTH_RETRIES};
pub use request::{build_url, merge_headers, RequestBody, RequestDescriptor};

#[cfg(test)]
mod tests;
