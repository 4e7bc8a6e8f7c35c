//! Request authentication dispatch
//!
//! Classifies the presented token, verifies it against the matching
//! scheme, and hands back the authenticated identity together with a
//! response signer bound to the exact key that authenticated the
//! request.
//!
//! Error shape is deliberate: a disabled scheme is reported as such
//! before any vault work, while every other security decision collapses
//! into one generic failure so callers cannot probe whether the user,
//! the key, or the signature was wrong.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use uuid::Uuid;

use crate::config::Scope;
use crate::domain::auth::token::SecurityToken;
use crate::domain::identity::{AuthInfo, IdentityRegistry};
use crate::domain::keys::derive::KeyDerivationEngine;
use crate::domain::keys::id::{KeyPurpose, StatelessKeyName, StatelessKind};
use crate::domain::keys::mac::{KeyDerivationStrategy, MacAlgorithm};
use crate::domain::keys::vault::KeyVault;
use crate::error::{Error, Result};

/// Privilege tier granted by a successful authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    Anonymous,
    /// Clear secret over a secure channel
    SafeOps,
    /// Stateless MAC
    PrivilegedOps,
    /// Master-key MAC
    ExceptionalOps,
}

/// Deferred response-signing context.
///
/// Carries exactly the inputs that authenticated the request, so the
/// response is signed with the same key and algorithm, never a freshly
/// selected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSigner {
    Stateless {
        user: Uuid,
        algo: MacAlgorithm,
    },
    Master {
        msid: Uuid,
        algo: MacAlgorithm,
        kds: KeyDerivationStrategy,
        prm: String,
    },
}

/// Outcome of a successful authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub auth: Option<AuthInfo>,
    pub level: SecurityLevel,
    pub signer: Option<ResponseSigner>,
}

impl AuthOutcome {
    fn anonymous() -> Self {
        Self {
            auth: None,
            level: SecurityLevel::Anonymous,
            signer: None,
        }
    }
}

pub struct AuthenticationDispatcher {
    vault: Arc<dyn KeyVault>,
    registry: Arc<IdentityRegistry>,
    engine: Arc<KeyDerivationEngine>,
    scope: Arc<Scope>,
}

impl AuthenticationDispatcher {
    pub fn new(
        vault: Arc<dyn KeyVault>,
        registry: Arc<IdentityRegistry>,
        engine: Arc<KeyDerivationEngine>,
        scope: Arc<Scope>,
    ) -> Self {
        Self {
            vault,
            registry,
            engine,
            scope,
        }
    }

    /// Authenticate a request against its token.
    ///
    /// `base` is the canonical MAC base of the request message; it is
    /// ignored for clear-secret and anonymous tokens.
    pub async fn authenticate(&self, token: &SecurityToken, base: &[u8]) -> Result<AuthOutcome> {
        let config = self.scope.config();

        match token {
            SecurityToken::Anonymous => Ok(AuthOutcome::anonymous()),
            SecurityToken::ClearSecret { user, secret } => {
                if !config.clear_auth {
                    return Err(Error::security("Clear text auth is disabled"));
                }
                self.check_clear(user, secret)
                    .await
                    .map_err(Error::masked_for_auth)
            }
            SecurityToken::StatelessMac { user, algo, sig } => {
                if !config.mac_auth {
                    return Err(Error::security("Stateless MAC auth is disabled"));
                }
                self.check_stateless_mac(user, algo, sig, base)
                    .await
                    .map_err(Error::masked_for_auth)
            }
            SecurityToken::MasterMac {
                msid,
                algo,
                kds,
                prm,
                sig,
            } => {
                if !config.master_auth {
                    return Err(Error::security("Master auth is disabled"));
                }
                self.check_master_mac(msid, algo, kds, prm, sig, base)
                    .await
                    .map_err(Error::masked_for_auth)
            }
        }
    }

    /// Sign a response with the key that authenticated its request
    pub async fn sign_response(&self, signer: &ResponseSigner, base: &[u8]) -> Result<String> {
        match signer {
            ResponseSigner::Stateless { user, algo } => {
                let key = self.stateless_key(*user, StatelessKind::Mac).await?;
                let sig = self.vault.sign(key, *algo, base).await?;
                Ok(BASE64.encode(sig))
            }
            ResponseSigner::Master {
                msid,
                algo,
                kds,
                prm,
            } => {
                // Signing only reuses the key minted during checkMAC
                let derived = self
                    .engine
                    .ensure_derived_key(
                        *msid,
                        *kds,
                        *algo,
                        &self.self_global_id()?,
                        KeyPurpose::Mac,
                        prm,
                        true,
                    )
                    .await?;
                let sig = self.vault.sign(derived.key_id, *algo, base).await?;
                Ok(BASE64.encode(sig))
            }
        }
    }

    async fn check_clear(&self, user: &str, secret: &str) -> Result<AuthOutcome> {
        let user_id = parse_local_id(user)?;
        let info = self.registry.check_enabled(user_id).await?;

        let key = self.stateless_key(user_id, StatelessKind::Password).await?;
        self.vault.verify_plain(key, secret.as_bytes()).await?;

        tracing::debug!(user = %user_id, "clear secret verified");
        Ok(AuthOutcome {
            auth: Some(AuthInfo {
                local_id: user_id,
                global_id: info.global_id,
            }),
            level: SecurityLevel::SafeOps,
            signer: None,
        })
    }

    async fn check_stateless_mac(
        &self,
        user: &str,
        algo: &str,
        sig: &str,
        base: &[u8],
    ) -> Result<AuthOutcome> {
        let user_id = parse_local_id(user)?;
        let algo: MacAlgorithm = algo.parse()?;
        let info = self.registry.check_enabled(user_id).await?;

        let key = self.stateless_key(user_id, StatelessKind::Mac).await?;
        let sigbuf = decode_sig(sig)?;
        self.vault.verify(key, algo, base, &sigbuf).await?;

        tracing::debug!(user = %user_id, algo = %algo, "stateless MAC verified");
        Ok(AuthOutcome {
            auth: Some(AuthInfo {
                local_id: user_id,
                global_id: info.global_id,
            }),
            level: SecurityLevel::PrivilegedOps,
            signer: Some(ResponseSigner::Stateless {
                user: user_id,
                algo,
            }),
        })
    }

    async fn check_master_mac(
        &self,
        msid: &str,
        algo: &str,
        kds: &str,
        prm: &str,
        sig: &str,
        base: &[u8],
    ) -> Result<AuthOutcome> {
        let msid = parse_local_id(msid)?;
        let algo: MacAlgorithm = algo.parse()?;
        let kds: KeyDerivationStrategy = kds.parse()?;

        let derived = self
            .engine
            .ensure_derived_key(
                msid,
                kds,
                algo,
                &self.self_global_id()?,
                KeyPurpose::Mac,
                prm,
                false,
            )
            .await?;

        let sigbuf = decode_sig(sig)?;
        self.vault.verify(derived.key_id, algo, base, &sigbuf).await?;

        tracing::debug!(user = %derived.auth.local_id, algo = %algo, "master MAC verified");
        Ok(AuthOutcome {
            auth: Some(derived.auth),
            level: SecurityLevel::ExceptionalOps,
            signer: Some(ResponseSigner::Master {
                msid,
                algo,
                kds,
                prm: prm.to_string(),
            }),
        })
    }

    /// Resolve the stateless key for a user with this service as partner
    async fn stateless_key(&self, user: Uuid, kind: StatelessKind) -> Result<Uuid> {
        let system = self
            .scope
            .system()
            .ok_or_else(|| Error::Internal("system identity not initialized".to_string()))?;
        let name = StatelessKeyName::new(user, system.local_id, kind);
        Ok(self.vault.ext_key_info(&name.to_string()).await?.local_id)
    }

    /// MAC target for master-level operations: the request is addressed
    /// to this service, so the derivation peer is the primary domain.
    fn self_global_id(&self) -> Result<String> {
        self.scope
            .config()
            .primary_domain()
            .map(str::to_string)
            .ok_or_else(|| Error::Internal("no domains configured".to_string()))
    }
}

fn parse_local_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| Error::InvalidInput(format!("not a local id: {raw}")))
}

fn decode_sig(sig: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(sig)
        .map_err(|_| Error::InvalidInput("signature is not base64".to_string()))
}
