//! Key vault seam
//!
//! All key material lives behind this trait. Callers address keys by
//! local uuid or by the composite external ids from [`super::id`];
//! material only crosses the boundary through the explicit expose
//! operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::mac::{KeyDerivationStrategy, MacAlgorithm};
use crate::error::Result;

/// What operations a stored key may participate in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    /// Material may be exposed to the owner
    Shared,
    /// May serve as the base of key derivation
    Derive,
    /// May sign and verify
    Sign,
    /// May encrypt and decrypt
    Encrypt,
    /// Short-lived, safe to wipe on sight
    Temp,
}

/// Requested shape of newly generated material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Hmac { bits: u32 },
    Aes { bits: u32 },
    /// Printable secret of exactly `len` bytes
    Password { len: usize },
}

/// Opaque caller-supplied parameters stored alongside a key.
///
/// Carrying the owning identity here lets the derivation fast path
/// answer without a user-store round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyParams {
    pub local_id: Option<Uuid>,
    pub global_id: Option<String>,
    /// KDF info input for derived keys
    pub info: Option<String>,
}

/// Metadata of a stored key, never the material itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub local_id: Uuid,
    pub ext_id: String,
    pub usage: Vec<KeyUsage>,
    pub bits: u32,
    pub params: KeyParams,
    pub created_at: DateTime<Utc>,
}

impl KeyInfo {
    pub fn can(&self, usage: KeyUsage) -> bool {
        self.usage.contains(&usage)
    }
}

/// Storage and crypto operations over managed keys
///
/// Lookups return [`crate::error::Error::UnknownKeyId`] for absent keys.
/// `generate_key` on an existing external id returns
/// [`crate::error::Error::Duplicate`]; `wipe_key` of an absent id is a
/// successful no-op.
#[async_trait]
pub trait KeyVault: Send + Sync {
    async fn key_info(&self, local_id: Uuid) -> Result<KeyInfo>;

    async fn ext_key_info(&self, ext_id: &str) -> Result<KeyInfo>;

    /// All keys whose external id starts with `ext_prefix`
    async fn list_keys(&self, ext_prefix: &str) -> Result<Vec<KeyInfo>>;

    /// Generate fresh random material under a new external id
    async fn generate_key(
        &self,
        ext_id: &str,
        usage: &[KeyUsage],
        spec: KeySpec,
        params: &KeyParams,
    ) -> Result<Uuid>;

    /// Derive a new key from `base_id` with the strategy's KDF,
    /// using `params.info` as the KDF info input
    async fn derive_key(
        &self,
        ext_id: &str,
        usage: &[KeyUsage],
        bits: u32,
        base_id: Uuid,
        kds: KeyDerivationStrategy,
        salt: &[u8],
        params: &KeyParams,
    ) -> Result<Uuid>;

    /// Destroy a key; absent ids are ignored
    async fn wipe_key(&self, local_id: Uuid) -> Result<()>;

    /// Raw material of a `Shared` key
    async fn expose_key(&self, local_id: Uuid) -> Result<Vec<u8>>;

    /// Material of `local_id` sealed under the `Encrypt` key `enc_id`
    async fn encrypted_key(&self, local_id: Uuid, enc_id: Uuid) -> Result<Vec<u8>>;

    async fn sign(&self, local_id: Uuid, algo: MacAlgorithm, data: &[u8]) -> Result<Vec<u8>>;

    /// Verify a MAC, failing with
    /// [`crate::error::Error::InvalidSignature`] on mismatch
    async fn verify(
        &self,
        local_id: Uuid,
        algo: MacAlgorithm,
        data: &[u8],
        sig: &[u8],
    ) -> Result<()>;

    /// Constant-time comparison of a presented clear secret
    async fn verify_plain(&self, local_id: Uuid, secret: &[u8]) -> Result<()>;
}
