//! Domain logic
//!
//! Identity, key, event, and authentication semantics, independent of
//! any concrete storage or vault backend.

pub mod auth;
pub mod events;
pub mod identity;
pub mod keys;
