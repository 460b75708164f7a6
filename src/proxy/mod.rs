//! Proxy routing module
//!
//! Decides per target host whether requests go through the configured proxy
//! and answers Basic proxy authentication challenges.

mod router;

pub use router::{compile_patterns, ProxyConfig, ProxyDecision, ProxyRouter};
