//! Derived key lifecycle
//!
//! Derived keys are addressed deterministically, so "ensure" is the
//! only primitive: the fast path reuses an existing key without any
//! quota or identity checks (it was counted and checked when minted),
//! the slow path validates the owner and quota before deriving.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use uuid::Uuid;

use crate::domain::identity::{AuthInfo, IdentityRegistry};
use crate::domain::keys::id::{DerivedKeyName, KeyPurpose};
use crate::domain::keys::mac::{KeyDerivationStrategy, MacAlgorithm};
use crate::domain::keys::vault::{KeyParams, KeyUsage, KeyVault};
use crate::error::{Error, Result};

/// A derived key together with the identity that owns its master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub auth: AuthInfo,
    pub algo: MacAlgorithm,
    pub key_id: Uuid,
}

/// Derived key material sealed for transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeyExposure {
    pub auth: AuthInfo,
    pub prm: String,
    pub etype: &'static str,
    pub emode: &'static str,
    /// Base64 of the AES-GCM sealed material
    pub ekey: String,
}

pub struct KeyDerivationEngine {
    vault: Arc<dyn KeyVault>,
    registry: Arc<IdentityRegistry>,
}

impl KeyDerivationEngine {
    pub fn new(vault: Arc<dyn KeyVault>, registry: Arc<IdentityRegistry>) -> Self {
        Self { vault, registry }
    }

    /// Reuse or mint the derived key for the given master key and
    /// derivation inputs.
    ///
    /// With `forbid_derive` the call only ever reuses: response signing
    /// must not mint keys the request did not already establish.
    pub async fn ensure_derived_key(
        &self,
        master_id: Uuid,
        kds: KeyDerivationStrategy,
        algo: MacAlgorithm,
        target_global_id: &str,
        purpose: KeyPurpose,
        param: &str,
        forbid_derive: bool,
    ) -> Result<DerivedKey> {
        let name = DerivedKeyName {
            master_id,
            kds,
            family: algo.family(),
            peer_global_id: target_global_id.to_string(),
            purpose,
            param: param.to_string(),
        };
        let ext_id = name.to_string();

        match self.vault.ext_key_info(&ext_id).await {
            Ok(info) => return Self::derived_from_params(algo, info.local_id, &info.params),
            Err(Error::UnknownKeyId(_)) => {}
            Err(e) => return Err(e),
        }

        if forbid_derive {
            return Err(Error::UnknownKeyId(ext_id));
        }

        let master = self.vault.key_info(master_id).await?;
        let owner = master
            .params
            .local_id
            .ok_or_else(|| Error::Internal(format!("master key {master_id} has no owner")))?;
        let owner_info = self.registry.check_enabled(owner).await?;

        let existing = self
            .vault
            .list_keys(&DerivedKeyName::master_prefix(master_id))
            .await?;
        if (existing.len() + 1) as u32 >= owner_info.ds_max {
            return Err(Error::security("Too many derived keys"));
        }

        let usage: &[KeyUsage] = match purpose {
            KeyPurpose::Enc => &[KeyUsage::Encrypt, KeyUsage::Temp],
            KeyPurpose::Mac => &[KeyUsage::Sign, KeyUsage::Temp],
        };
        let params = KeyParams {
            local_id: Some(owner),
            global_id: Some(owner_info.global_id.clone()),
            info: Some(param.to_string()),
        };

        let derived = self
            .vault
            .derive_key(
                &ext_id,
                usage,
                master.bits,
                master_id,
                kds,
                name.kdf_salt().as_bytes(),
                &params,
            )
            .await;

        let key_id = match derived {
            Ok(key_id) => key_id,
            // Lost a concurrent derivation race; the winner's key is usable
            Err(Error::Duplicate(_)) => self.vault.ext_key_info(&ext_id).await?.local_id,
            Err(e) => return Err(e),
        };

        tracing::debug!(master_id = %master_id, key_id = %key_id, %purpose, "derived key minted");

        Ok(DerivedKey {
            auth: AuthInfo {
                local_id: owner,
                global_id: owner_info.global_id,
            },
            algo,
            key_id,
        })
    }

    /// Seal the MAC derived key under a sibling ENC key and hand it out.
    ///
    /// The ENC key exists only for this exchange and is wiped before
    /// returning.
    pub async fn expose_derived_key(
        &self,
        master_id: Uuid,
        kds: KeyDerivationStrategy,
        algo: MacAlgorithm,
        target_global_id: &str,
        param: &str,
    ) -> Result<DerivedKeyExposure> {
        let mac_key = self
            .ensure_derived_key(
                master_id,
                kds,
                algo,
                target_global_id,
                KeyPurpose::Mac,
                param,
                false,
            )
            .await?;
        let enc_key = self
            .ensure_derived_key(
                master_id,
                kds,
                algo,
                target_global_id,
                KeyPurpose::Enc,
                param,
                false,
            )
            .await?;

        let sealed = self.vault.encrypted_key(mac_key.key_id, enc_key.key_id).await;
        self.vault.wipe_key(enc_key.key_id).await?;
        let sealed = sealed?;

        Ok(DerivedKeyExposure {
            auth: mac_key.auth,
            prm: param.to_string(),
            etype: "AES",
            emode: "GCM",
            ekey: BASE64.encode(sealed),
        })
    }

    fn derived_from_params(
        algo: MacAlgorithm,
        key_id: Uuid,
        params: &KeyParams,
    ) -> Result<DerivedKey> {
        match (params.local_id, params.global_id.as_ref()) {
            (Some(local_id), Some(global_id)) => Ok(DerivedKey {
                auth: AuthInfo {
                    local_id,
                    global_id: global_id.clone(),
                },
                algo,
                key_id,
            }),
            _ => Err(Error::Internal(format!(
                "derived key {key_id} has no owner params"
            ))),
        }
    }
}
