//! Key domain
//!
//! Algorithm registries, composite key naming, the vault seam, and the
//! master/derived/stateless key lifecycles built on top of it.

pub mod derive;
pub mod id;
pub mod mac;
pub mod rotate;
pub mod stateless;
pub mod vault;

pub use derive::{DerivedKey, DerivedKeyExposure, KeyDerivationEngine};
pub use id::{DerivedKeyName, KeyPurpose, MasterKeyName, StatelessKeyName, StatelessKind};
pub use mac::{KeyDerivationStrategy, MacAlgorithm, MacFamily};
pub use rotate::{ExchangedMasterKey, IssuedMasterKey, MasterKeyRotator};
pub use stateless::StatelessSecretManager;
pub use vault::{KeyInfo, KeyParams, KeySpec, KeyUsage, KeyVault};
