//! Error types for Keyward

use thiserror::Error;

/// Result type alias using Keyward's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Public message for every masked authentication failure.
pub const AUTH_FAILED: &str = "Authentication failed";

/// Keyward error types
///
/// Management-facing operations propagate specific messages; request
/// authentication paths collapse security decisions into a single generic
/// [`AUTH_FAILED`] message via [`Error::masked_for_auth`].
#[derive(Error, Debug)]
pub enum Error {
    // Not-found errors, local-only, never cross an auth boundary unmasked
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown key ID: {0}")]
    UnknownKeyId(String),

    // The only error class exposed across an authentication boundary
    #[error("{0}")]
    Security(String),

    // Misconfiguration on management-facing operations
    #[error("Internal error: {0}")]
    Internal(String),

    // Storage-level uniqueness conflict, recovered by bounded retry
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Invalid signature")]
    InvalidSignature,

    // Stateless secret queried before it was generated
    #[error("Secret is not set")]
    NotSet,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Security error with a specific management-facing message.
    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    /// Generic authentication failure with no diagnostic detail.
    pub fn auth_failed() -> Self {
        Self::Security(AUTH_FAILED.to_string())
    }

    /// Collapse security-decision errors into a generic failure.
    ///
    /// Callers of verification paths must not learn whether the user,
    /// the key, the algorithm, or the signature was wrong; `Internal`
    /// is masked too since it can carry vault detail. Only storage and
    /// I/O reach failures pass through unmasked.
    pub fn masked_for_auth(self) -> Self {
        match self {
            Self::Database(_) | Self::Io(_) => self,
            other => {
                tracing::debug!(detail = %other, "authentication failure masked");
                Self::auth_failed()
            }
        }
    }
}
