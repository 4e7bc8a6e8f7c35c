//! Authentication domain
//!
//! Token classification and scheme dispatch.

pub mod dispatcher;
pub mod token;

pub use dispatcher::{AuthOutcome, AuthenticationDispatcher, ResponseSigner, SecurityLevel};
pub use token::SecurityToken;
