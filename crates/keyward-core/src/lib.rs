//! Keyward Core Library
//!
//! Federated authentication core: identity registry, master and derived
//! key lifecycle, stateless secrets, and MAC-based request
//! authentication, over pluggable storage and key-vault backends.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export common types for convenience
pub use app::AuthRuntime;
pub use config::{AuthConfig, Scope, SystemIdentity};
pub use domain::*;
pub use error::{Error, Result};
