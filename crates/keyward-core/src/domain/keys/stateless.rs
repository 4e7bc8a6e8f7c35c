//! Stateless per-pair secrets
//!
//! One secret per (user, service, kind) triple, stored only in the
//! vault and regenerated wholesale: generation always removes any
//! previous secret first, so there is never a window with two live
//! secrets for one pair.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use uuid::Uuid;

use crate::config::Scope;
use crate::domain::events::{EventKind, EventPublisher};
use crate::domain::identity::IdentityRegistry;
use crate::domain::keys::id::{StatelessKeyName, StatelessKind};
use crate::domain::keys::vault::{KeyParams, KeySpec, KeyUsage, KeyVault};
use crate::error::{Error, Result};

pub struct StatelessSecretManager {
    vault: Arc<dyn KeyVault>,
    registry: Arc<IdentityRegistry>,
    events: Arc<dyn EventPublisher>,
    scope: Arc<Scope>,
}

impl StatelessSecretManager {
    pub fn new(
        vault: Arc<dyn KeyVault>,
        registry: Arc<IdentityRegistry>,
        events: Arc<dyn EventPublisher>,
        scope: Arc<Scope>,
    ) -> Self {
        Self {
            vault,
            registry,
            events,
            scope,
        }
    }

    /// Replace the pair's secret with fresh material and return it.
    ///
    /// Passwords come back as printable UTF-8 of `password_len` chars,
    /// MAC secrets as base64 of `key_bits` random bits. Management
    /// gates report `Internal` rather than a security failure: this is
    /// an administrative misconfiguration, not an auth decision.
    pub async fn gen_new_secret(
        &self,
        user: Uuid,
        service: Uuid,
        kind: StatelessKind,
    ) -> Result<String> {
        self.remove_secret(user, service, kind).await?;

        let config = self.scope.config();
        match kind {
            StatelessKind::Password if !config.clear_auth => {
                return Err(Error::Internal("Clear text auth is disabled".to_string()));
            }
            StatelessKind::Mac if !config.mac_auth => {
                return Err(Error::Internal(
                    "Stateless MAC auth is disabled".to_string(),
                ));
            }
            _ => {}
        }

        let user_info = self.registry.get_user_info(user).await?;
        self.events
            .emit(
                EventKind::StlsNew,
                json!({
                    "user": user,
                    "service": service,
                    "for_mac": kind == StatelessKind::Mac,
                }),
            )
            .await?;

        let spec = match kind {
            StatelessKind::Mac => KeySpec::Hmac {
                bits: config.key_bits,
            },
            StatelessKind::Password => KeySpec::Password {
                len: config.password_len,
            },
        };
        let params = KeyParams {
            local_id: Some(user),
            global_id: Some(user_info.global_id),
            info: None,
        };
        let name = StatelessKeyName::new(user, service, kind);
        let key_id = self
            .vault
            .generate_key(
                &name.to_string(),
                &[KeyUsage::Shared, KeyUsage::Sign],
                spec,
                &params,
            )
            .await?;

        tracing::info!(user = %user, service = %service, kind = %kind, "stateless secret generated");

        let material = self.vault.expose_key(key_id).await?;
        self.encode(kind, material)
    }

    /// Fetch the current secret; `NotSet` when the pair has none
    pub async fn get_secret(
        &self,
        user: Uuid,
        service: Uuid,
        kind: StatelessKind,
    ) -> Result<String> {
        self.check_users(user, service).await?;

        let name = StatelessKeyName::new(user, service, kind);
        let info = match self.vault.ext_key_info(&name.to_string()).await {
            Ok(info) => info,
            Err(Error::UnknownKeyId(_)) => return Err(Error::NotSet),
            Err(e) => return Err(e),
        };

        let material = self.vault.expose_key(info.local_id).await?;
        self.encode(kind, material)
    }

    /// Remove the pair's secret; succeeds whether or not one existed.
    ///
    /// The removal event is emitted regardless so downstream consumers
    /// converge on "no secret" even after partial failures.
    pub async fn remove_secret(
        &self,
        user: Uuid,
        service: Uuid,
        kind: StatelessKind,
    ) -> Result<()> {
        self.check_users(user, service).await?;

        self.events
            .emit(
                EventKind::StlsDel,
                json!({
                    "user": user,
                    "service": service,
                    "for_mac": kind == StatelessKind::Mac,
                }),
            )
            .await?;

        let name = StatelessKeyName::new(user, service, kind);
        match self.vault.ext_key_info(&name.to_string()).await {
            Ok(info) => {
                self.vault.wipe_key(info.local_id).await?;
                tracing::info!(user = %user, service = %service, kind = %kind, "stateless secret removed");
                Ok(())
            }
            Err(Error::UnknownKeyId(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn check_users(&self, user: Uuid, service: Uuid) -> Result<()> {
        self.registry.get_user_info(user).await?;
        self.registry.get_user_info(service).await?;
        Ok(())
    }

    fn encode(&self, kind: StatelessKind, material: Vec<u8>) -> Result<String> {
        match kind {
            StatelessKind::Mac => Ok(BASE64.encode(material)),
            StatelessKind::Password => String::from_utf8(material)
                .map_err(|_| Error::Internal("password material is not UTF-8".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::AuthConfig;
    use crate::domain::events::InMemoryEventBus;
    use crate::domain::identity::testing::MockUserStore;
    use crate::domain::identity::UserProfileCache;
    use crate::infrastructure::vault::MemoryKeyVault;

    struct Fixture {
        registry: Arc<IdentityRegistry>,
        bus: Arc<InMemoryEventBus>,
        scope: Arc<Scope>,
        manager: StatelessSecretManager,
    }

    fn fixture() -> Fixture {
        let config = AuthConfig {
            domains: vec!["example.com".to_string()],
            clear_auth: true,
            mac_auth: true,
            ..AuthConfig::default()
        };
        let scope = Arc::new(Scope::new(config));
        let store = Arc::new(MockUserStore::new());
        let cache = Arc::new(UserProfileCache::new(64, Duration::from_secs(60)));
        let registry = Arc::new(IdentityRegistry::new(store, cache, scope.clone()));
        let vault = Arc::new(MemoryKeyVault::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let manager =
            StatelessSecretManager::new(vault, registry.clone(), bus.clone(), scope.clone());
        Fixture {
            registry,
            bus,
            scope,
            manager,
        }
    }

    async fn pair(fx: &Fixture) -> (Uuid, Uuid) {
        let user = fx.registry.ensure_user("user1", "example.com").await.unwrap();
        let service = fx
            .registry
            .ensure_service("svc1", "example.com")
            .await
            .unwrap();
        (user, service)
    }

    #[tokio::test]
    async fn password_has_configured_length() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        let secret = fx
            .manager
            .gen_new_secret(user, service, StatelessKind::Password)
            .await
            .unwrap();
        assert_eq!(secret.chars().count(), 16);
        assert!(secret.is_ascii());
    }

    #[tokio::test]
    async fn mac_secret_is_base64_of_key_bits() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        let secret = fx
            .manager
            .gen_new_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap();
        // 256 bits → 44 base64 chars
        assert_eq!(secret.len(), 44);
        assert!(BASE64.decode(&secret).is_ok());
    }

    #[tokio::test]
    async fn regeneration_replaces_material() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        let first = fx
            .manager
            .gen_new_secret(user, service, StatelessKind::Password)
            .await
            .unwrap();
        let read_back = fx
            .manager
            .get_secret(user, service, StatelessKind::Password)
            .await
            .unwrap();
        assert_eq!(first, read_back);

        let second = fx
            .manager
            .gen_new_secret(user, service, StatelessKind::Password)
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(
            fx.manager
                .get_secret(user, service, StatelessKind::Password)
                .await
                .unwrap(),
            second
        );
    }

    #[tokio::test]
    async fn kinds_are_independent() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        fx.manager
            .gen_new_secret(user, service, StatelessKind::Password)
            .await
            .unwrap();
        let err = fx
            .manager
            .get_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSet));
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        fx.manager
            .gen_new_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap();
        fx.manager
            .remove_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap();

        let err = fx
            .manager
            .get_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotSet));

        // Removing again still succeeds and still emits
        fx.manager
            .remove_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap();
        assert!(fx.bus.events_by_kind(EventKind::StlsDel).len() >= 2);
    }

    #[tokio::test]
    async fn management_gates_report_internal_errors() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        fx.scope.update_config(|c| c.clear_auth = false);
        let err = fx
            .manager
            .gen_new_secret(user, service, StatelessKind::Password)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("Clear text auth is disabled"));

        fx.scope.update_config(|c| c.mac_auth = false);
        let err = fx
            .manager
            .gen_new_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("Stateless MAC auth is disabled"));
    }

    #[tokio::test]
    async fn lifecycle_emits_events() {
        let fx = fixture();
        let (user, service) = pair(&fx).await;

        fx.manager
            .gen_new_secret(user, service, StatelessKind::Mac)
            .await
            .unwrap();
        assert_eq!(fx.bus.events_by_kind(EventKind::StlsNew).len(), 1);
        // Generation removes first, so a deletion event precedes it
        assert_eq!(fx.bus.events_by_kind(EventKind::StlsDel).len(), 1);

        let new_event = &fx.bus.events_by_kind(EventKind::StlsNew)[0];
        assert_eq!(new_event.data["for_mac"], serde_json::json!(true));
        assert_eq!(
            new_event.data["user"],
            serde_json::json!(user.to_string())
        );
    }

    #[tokio::test]
    async fn unknown_identities_are_rejected() {
        let fx = fixture();
        let (user, _) = pair(&fx).await;

        let err = fx
            .manager
            .gen_new_secret(user, Uuid::new_v4(), StatelessKind::Password)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownUser(_)));
    }
}
