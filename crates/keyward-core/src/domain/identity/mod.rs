//! Identity domain
//!
//! Identity records, the race-safe registry, the storage seam, and the
//! event-patched profile cache.

pub mod cache;
pub mod record;
pub mod registry;
pub mod store;

#[cfg(test)]
pub mod testing;

pub use cache::UserProfileCache;
pub use record::{AuthInfo, FieldChanges, ProfilePatch, UserInfo, UserRecord, UserUpdate};
pub use registry::{IdentityRegistry, ProfileCacheSubscriber};
pub use store::UserStore;
