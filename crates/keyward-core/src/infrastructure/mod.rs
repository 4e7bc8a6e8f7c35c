//! Reference backends for the domain seams

pub mod storage;
pub mod vault;

pub use storage::SqliteUserStore;
pub use vault::MemoryKeyVault;
