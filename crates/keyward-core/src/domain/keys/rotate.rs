//! Master key lifecycle
//!
//! Two issuance paths with different trust assumptions: the management
//! path hands out plain material once over a trusted channel after a
//! full reset, and the self-service exchange path rotates within a
//! scope, sealing the new material under the presented (expiring) key
//! so only its holder can read the replacement.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use uuid::Uuid;

use crate::config::Scope;
use crate::domain::events::{EventKind, EventPublisher};
use crate::domain::identity::IdentityRegistry;
use crate::domain::keys::derive::KeyDerivationEngine;
use crate::domain::keys::id::{DerivedKeyName, KeyPurpose, MasterKeyName};
use crate::domain::keys::mac::{KeyDerivationStrategy, MacAlgorithm};
use crate::domain::keys::vault::{KeyParams, KeySpec, KeyUsage, KeyVault};
use crate::error::{Error, Result};

const MASTER_USAGE: &[KeyUsage] = &[KeyUsage::Shared, KeyUsage::Derive];

/// Result of the plain management issuance: material leaves exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedMasterKey {
    pub id: Uuid,
    /// Base64 raw material
    pub secret: String,
}

/// Result of the self-service exchange: material is sealed for the
/// holder of the presented key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedMasterKey {
    pub id: Uuid,
    pub etype: &'static str,
    pub emode: &'static str,
    /// Base64 of the AES-GCM sealed material
    pub ekey: String,
}

pub struct MasterKeyRotator {
    vault: Arc<dyn KeyVault>,
    registry: Arc<IdentityRegistry>,
    engine: Arc<KeyDerivationEngine>,
    events: Arc<dyn EventPublisher>,
    scope: Arc<Scope>,
}

impl MasterKeyRotator {
    pub fn new(
        vault: Arc<dyn KeyVault>,
        registry: Arc<IdentityRegistry>,
        engine: Arc<KeyDerivationEngine>,
        events: Arc<dyn EventPublisher>,
        scope: Arc<Scope>,
    ) -> Self {
        Self {
            vault,
            registry,
            engine,
            events,
            scope,
        }
    }

    /// Issue a fresh primary master key over the management channel.
    ///
    /// Destructive full reset: every existing master key of the owner,
    /// in every scope, is wiped together with its derived subtree, then
    /// exactly one replacement is generated at `{owner}:MSTR::1`. The
    /// raw material is returned once and is not retrievable again.
    pub async fn issue_new_key(&self, owner: Uuid) -> Result<IssuedMasterKey> {
        let config = self.scope.config();
        if !config.master_auth {
            return Err(Error::security("Master auth is disabled"));
        }

        let owner_info = self.registry.get_user_info(owner).await?;

        let existing = self
            .vault
            .list_keys(&MasterKeyName::user_prefix(owner))
            .await?;
        for key in &existing {
            self.retire_master_key(owner, key.local_id).await?;
        }

        let name = MasterKeyName::new(owner, "", 1);
        let params = KeyParams {
            local_id: Some(owner),
            global_id: Some(owner_info.global_id.clone()),
            info: None,
        };
        let key_id = self
            .vault
            .generate_key(
                &name.to_string(),
                MASTER_USAGE,
                KeySpec::Hmac {
                    bits: config.key_bits,
                },
                &params,
            )
            .await?;
        self.events
            .emit(
                EventKind::MstrNew,
                json!({ "user": owner, "key_id": key_id, "scope": "" }),
            )
            .await?;

        tracing::info!(user = %owner, key_id = %key_id, "master key issued");

        let material = self.vault.expose_key(key_id).await?;
        Ok(IssuedMasterKey {
            id: key_id,
            secret: BASE64.encode(material),
        })
    }

    /// Rotate a master key within `new_scope`, authenticated by the
    /// presented key itself.
    ///
    /// Only an unscoped (primary) key may initiate an exchange, and the
    /// system identity may not use this path at all. The presented key
    /// survives; everything else in the target scope is retired, and the
    /// new material is returned sealed under an encryption key derived
    /// from the presented key.
    pub async fn exchange_key(
        &self,
        presented_id: Uuid,
        new_scope: &str,
        kds: KeyDerivationStrategy,
        algo: MacAlgorithm,
        param: &str,
    ) -> Result<ExchangedMasterKey> {
        let config = self.scope.config();
        if !config.master_auth {
            return Err(Error::security("Master auth is disabled"));
        }

        let presented = self.vault.key_info(presented_id).await?;
        let presented_name = MasterKeyName::parse(&presented.ext_id).ok_or_else(|| {
            Error::Internal(format!("malformed master key id: {}", presented.ext_id))
        })?;
        if !presented_name.scope.is_empty() {
            return Err(Error::security(
                "Scoped Master key cannot be used for exchange",
            ));
        }

        let owner = presented_name.user;
        if self
            .scope
            .system()
            .is_some_and(|system| system.local_id == owner)
        {
            return Err(Error::security("Can not be used by AuthService itself"));
        }

        let owner_info = self.registry.check_enabled(owner).await?;

        let all_keys = self
            .vault
            .list_keys(&MasterKeyName::user_prefix(owner))
            .await?;
        // Doubled headroom: old and new keys coexist during rotation
        if (all_keys.len() + 1) as u32 >= owner_info.ms_max * 2 {
            return Err(Error::security("Too many Master keys"));
        }

        let same_scope = self
            .vault
            .list_keys(&MasterKeyName::scope_prefix(owner, new_scope))
            .await?;
        for key in &same_scope {
            if key.local_id != presented_id {
                self.retire_master_key(owner, key.local_id).await?;
            }
        }

        // Probe 1 then 2, never reusing the presented key's own slot
        let mut index = 1;
        for candidate in [1u8, 2] {
            index = candidate;
            let name = MasterKeyName::new(owner, new_scope, candidate);
            if name.to_string() != presented.ext_id {
                break;
            }
        }

        let name = MasterKeyName::new(owner, new_scope, index);
        let params = KeyParams {
            local_id: Some(owner),
            global_id: Some(owner_info.global_id.clone()),
            info: None,
        };
        let new_id = self
            .vault
            .generate_key(
                &name.to_string(),
                MASTER_USAGE,
                KeySpec::Hmac {
                    bits: config.key_bits,
                },
                &params,
            )
            .await?;
        self.events
            .emit(
                EventKind::MstrNew,
                json!({ "user": owner, "key_id": new_id, "scope": new_scope }),
            )
            .await?;

        tracing::info!(user = %owner, key_id = %new_id, scope = new_scope, "master key exchanged");

        let enc_key = self
            .engine
            .ensure_derived_key(
                presented_id,
                kds,
                algo,
                &owner_info.global_id,
                KeyPurpose::Enc,
                param,
                false,
            )
            .await?;
        let sealed = self.vault.encrypted_key(new_id, enc_key.key_id).await;
        self.vault.wipe_key(enc_key.key_id).await?;
        let sealed = sealed?;

        Ok(ExchangedMasterKey {
            id: new_id,
            etype: "AES",
            emode: "GCM",
            ekey: BASE64.encode(sealed),
        })
    }

    /// Wipe one master key, its derived subtree, and emit the deletion
    async fn retire_master_key(&self, owner: Uuid, key_id: Uuid) -> Result<()> {
        self.events
            .emit(
                EventKind::MstrDel,
                json!({ "user": owner, "key_id": key_id }),
            )
            .await?;

        let derived = self
            .vault
            .list_keys(&DerivedKeyName::master_prefix(key_id))
            .await?;
        for dkey in &derived {
            self.vault.wipe_key(dkey.local_id).await?;
        }
        self.vault.wipe_key(key_id).await?;

        tracing::info!(user = %owner, key_id = %key_id, derived = derived.len(), "master key wiped");
        Ok(())
    }
}
