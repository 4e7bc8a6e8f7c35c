//! In-process reference vault
//!
//! Implements the full [`KeyVault`] contract with in-memory storage:
//! HMAC over the SHA-2 family, HKDF derivation, AES-256-GCM key
//! sealing. Material is zeroized when a key is wiped or the vault is
//! dropped. GOST and KMAC identifiers parse at the registry level but
//! this vault does not implement them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use hkdf::Hkdf;
use hmac::{Hmac, Mac as _};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng as _, RngCore as _};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::keys::mac::{KeyDerivationStrategy, MacAlgorithm};
use crate::domain::keys::vault::{KeyInfo, KeyParams, KeySpec, KeyUsage, KeyVault};
use crate::error::{Error, Result};

const GCM_NONCE_LEN: usize = 12;

struct StoredKey {
    info: KeyInfo,
    material: Zeroizing<Vec<u8>>,
}

#[derive(Default)]
struct VaultState {
    keys: HashMap<Uuid, StoredKey>,
    by_ext: HashMap<String, Uuid>,
}

/// Reference [`KeyVault`] backed by process memory
#[derive(Default)]
pub struct MemoryKeyVault {
    state: Mutex<VaultState>,
}

impl MemoryKeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(
        &self,
        ext_id: &str,
        usage: &[KeyUsage],
        bits: u32,
        params: &KeyParams,
        material: Vec<u8>,
    ) -> Result<Uuid> {
        let mut state = self.state.lock().expect("vault lock poisoned");
        if state.by_ext.contains_key(ext_id) {
            return Err(Error::Duplicate(ext_id.to_string()));
        }

        let local_id = Uuid::new_v4();
        let info = KeyInfo {
            local_id,
            ext_id: ext_id.to_string(),
            usage: usage.to_vec(),
            bits,
            params: params.clone(),
            created_at: Utc::now(),
        };
        state.by_ext.insert(ext_id.to_string(), local_id);
        state.keys.insert(
            local_id,
            StoredKey {
                info,
                material: Zeroizing::new(material),
            },
        );
        Ok(local_id)
    }

    fn info_of(&self, local_id: Uuid) -> Result<KeyInfo> {
        self.state
            .lock()
            .expect("vault lock poisoned")
            .keys
            .get(&local_id)
            .map(|k| k.info.clone())
            .ok_or_else(|| Error::UnknownKeyId(local_id.to_string()))
    }

    fn material_of(&self, local_id: Uuid, usage: KeyUsage) -> Result<Zeroizing<Vec<u8>>> {
        let state = self.state.lock().expect("vault lock poisoned");
        let key = state
            .keys
            .get(&local_id)
            .ok_or_else(|| Error::UnknownKeyId(local_id.to_string()))?;
        if !key.info.can(usage) {
            return Err(Error::Internal(format!(
                "key {local_id} lacks {usage:?} usage"
            )));
        }
        Ok(key.material.clone())
    }

    fn mac(algo: MacAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        macro_rules! digest {
            ($hash:ty) => {{
                let mut mac = Hmac::<$hash>::new_from_slice(key)
                    .map_err(|_| Error::Internal("bad MAC key length".to_string()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }};
        }

        match algo {
            MacAlgorithm::HmacSha224 => digest!(Sha224),
            MacAlgorithm::HmacSha256 => digest!(Sha256),
            MacAlgorithm::HmacSha384 => digest!(Sha384),
            MacAlgorithm::HmacSha512 => digest!(Sha512),
            other => Err(Error::Internal(format!(
                "unsupported MAC algorithm: {other}"
            ))),
        }
    }

    fn hkdf(
        kds: KeyDerivationStrategy,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
        len: usize,
    ) -> Result<Vec<u8>> {
        let mut okm = vec![0u8; len];
        let expanded = match kds {
            KeyDerivationStrategy::Hkdf256 => {
                Hkdf::<Sha256>::new(Some(salt), ikm).expand(info, &mut okm)
            }
            KeyDerivationStrategy::Hkdf512 => {
                Hkdf::<Sha512>::new(Some(salt), ikm).expand(info, &mut okm)
            }
        };
        expanded.map_err(|_| Error::Internal("requested KDF output too long".to_string()))?;
        Ok(okm)
    }
}

#[async_trait]
impl KeyVault for MemoryKeyVault {
    async fn key_info(&self, local_id: Uuid) -> Result<KeyInfo> {
        self.info_of(local_id)
    }

    async fn ext_key_info(&self, ext_id: &str) -> Result<KeyInfo> {
        let state = self.state.lock().expect("vault lock poisoned");
        state
            .by_ext
            .get(ext_id)
            .and_then(|id| state.keys.get(id))
            .map(|k| k.info.clone())
            .ok_or_else(|| Error::UnknownKeyId(ext_id.to_string()))
    }

    async fn list_keys(&self, ext_prefix: &str) -> Result<Vec<KeyInfo>> {
        let state = self.state.lock().expect("vault lock poisoned");
        Ok(state
            .keys
            .values()
            .filter(|k| k.info.ext_id.starts_with(ext_prefix))
            .map(|k| k.info.clone())
            .collect())
    }

    async fn generate_key(
        &self,
        ext_id: &str,
        usage: &[KeyUsage],
        spec: KeySpec,
        params: &KeyParams,
    ) -> Result<Uuid> {
        let (material, bits) = match spec {
            KeySpec::Hmac { bits } | KeySpec::Aes { bits } => {
                if bits == 0 || bits % 8 != 0 {
                    return Err(Error::InvalidInput(format!("bad key size: {bits}")));
                }
                let mut material = vec![0u8; (bits / 8) as usize];
                OsRng.fill_bytes(&mut material);
                (material, bits)
            }
            KeySpec::Password { len } => {
                let password: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(len)
                    .map(char::from)
                    .collect();
                (password.into_bytes(), (len * 8) as u32)
            }
        };

        self.insert(ext_id, usage, bits, params, material)
    }

    async fn derive_key(
        &self,
        ext_id: &str,
        usage: &[KeyUsage],
        bits: u32,
        base_id: Uuid,
        kds: KeyDerivationStrategy,
        salt: &[u8],
        params: &KeyParams,
    ) -> Result<Uuid> {
        let base = self.material_of(base_id, KeyUsage::Derive)?;
        let info = params.info.as_deref().unwrap_or("");
        let material = Self::hkdf(kds, &base, salt, info.as_bytes(), (bits / 8) as usize)?;

        self.insert(ext_id, usage, bits, params, material)
    }

    async fn wipe_key(&self, local_id: Uuid) -> Result<()> {
        let mut state = self.state.lock().expect("vault lock poisoned");
        if let Some(key) = state.keys.remove(&local_id) {
            state.by_ext.remove(&key.info.ext_id);
            // Zeroizing material is dropped here
        }
        Ok(())
    }

    async fn expose_key(&self, local_id: Uuid) -> Result<Vec<u8>> {
        Ok(self.material_of(local_id, KeyUsage::Shared)?.to_vec())
    }

    async fn encrypted_key(&self, local_id: Uuid, enc_id: Uuid) -> Result<Vec<u8>> {
        // Scoped import: `aead::KeyInit` also provides `new_from_slice`
        // and must not shadow `hmac::Mac` in this module.
        use aes_gcm::aead::{Aead, KeyInit};
        use aes_gcm::{Aes256Gcm, Nonce};

        // The sealed key itself does not need Shared usage: it never
        // leaves in the clear.
        let plain = {
            let state = self.state.lock().expect("vault lock poisoned");
            state
                .keys
                .get(&local_id)
                .map(|k| k.material.clone())
                .ok_or_else(|| Error::UnknownKeyId(local_id.to_string()))?
        };
        let enc = self.material_of(enc_id, KeyUsage::Encrypt)?;

        let cipher = Aes256Gcm::new_from_slice(&enc)
            .map_err(|_| Error::Internal("encryption key must be 256 bits".to_string()))?;
        let mut nonce = [0u8; GCM_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_slice())
            .map_err(|_| Error::Internal("key sealing failed".to_string()))?;

        let mut out = Vec::with_capacity(GCM_NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    async fn sign(&self, local_id: Uuid, algo: MacAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let material = self.material_of(local_id, KeyUsage::Sign)?;
        Self::mac(algo, &material, data)
    }

    async fn verify(
        &self,
        local_id: Uuid,
        algo: MacAlgorithm,
        data: &[u8],
        sig: &[u8],
    ) -> Result<()> {
        let material = self.material_of(local_id, KeyUsage::Sign)?;
        let expected = Self::mac(algo, &material, data)?;
        if ct_eq(&expected, sig) {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }

    async fn verify_plain(&self, local_id: Uuid, secret: &[u8]) -> Result<()> {
        let material = self.material_of(local_id, KeyUsage::Sign)?;
        if ct_eq(&material, secret) {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}

/// Constant-time equality over equal-length inputs
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
