//! Runtime wiring
//!
//! Builds the component graph over pluggable store/vault backends and
//! bootstraps the service's own identity.

use std::sync::Arc;

use crate::config::{AuthConfig, Scope, SystemIdentity};
use crate::domain::auth::AuthenticationDispatcher;
use crate::domain::events::InMemoryEventBus;
use crate::domain::identity::{
    IdentityRegistry, ProfileCacheSubscriber, UserProfileCache, UserStore,
};
use crate::domain::keys::{
    KeyDerivationEngine, KeyVault, MasterKeyRotator, StatelessSecretManager,
};
use crate::error::{Error, Result};

/// Name component of the service's own identity, `auth.{domain}`
const SYSTEM_SERVICE_NAME: &str = "auth";

/// A fully wired authentication service core
pub struct AuthRuntime {
    pub scope: Arc<Scope>,
    pub events: Arc<InMemoryEventBus>,
    pub cache: Arc<UserProfileCache>,
    pub registry: Arc<IdentityRegistry>,
    pub engine: Arc<KeyDerivationEngine>,
    pub rotator: Arc<MasterKeyRotator>,
    pub stateless: Arc<StatelessSecretManager>,
    pub dispatcher: Arc<AuthenticationDispatcher>,
}

impl AuthRuntime {
    pub fn new(config: AuthConfig, store: Arc<dyn UserStore>, vault: Arc<dyn KeyVault>) -> Self {
        let cache = Arc::new(UserProfileCache::new(
            config.cache.capacity,
            config.cache.ttl(),
        ));
        let scope = Arc::new(Scope::new(config));
        let events = Arc::new(InMemoryEventBus::new());
        events.subscribe(Arc::new(ProfileCacheSubscriber::new(cache.clone())));

        let registry = Arc::new(IdentityRegistry::new(store, cache.clone(), scope.clone()));
        let engine = Arc::new(KeyDerivationEngine::new(vault.clone(), registry.clone()));
        let rotator = Arc::new(MasterKeyRotator::new(
            vault.clone(),
            registry.clone(),
            engine.clone(),
            events.clone(),
            scope.clone(),
        ));
        let stateless = Arc::new(StatelessSecretManager::new(
            vault.clone(),
            registry.clone(),
            events.clone(),
            scope.clone(),
        ));
        let dispatcher = Arc::new(AuthenticationDispatcher::new(
            vault,
            registry.clone(),
            engine.clone(),
            scope.clone(),
        ));

        Self {
            scope,
            events,
            cache,
            registry,
            engine,
            rotator,
            stateless,
            dispatcher,
        }
    }

    /// Bootstrap: ensure the service's own identity exists for the
    /// primary domain and record it in the scope. Idempotent.
    pub async fn init(&self) -> Result<()> {
        let config = self.scope.config();
        config
            .validate()
            .map_err(|e| Error::Internal(e.to_string()))?;
        let domain = config
            .primary_domain()
            .ok_or_else(|| Error::Internal("no domains configured".to_string()))?;

        let local_id = self
            .registry
            .ensure_service(SYSTEM_SERVICE_NAME, domain)
            .await?;
        let global_id = format!("{SYSTEM_SERVICE_NAME}.{domain}");
        self.scope.set_system(SystemIdentity {
            local_id,
            global_id: global_id.clone(),
        });

        tracing::info!(global_id, local_id = %local_id, "system identity ready");
        Ok(())
    }

    /// The service's own identity, available after [`Self::init`]
    pub fn system(&self) -> Result<SystemIdentity> {
        self.scope
            .system()
            .ok_or_else(|| Error::Internal("system identity not initialized".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::testing::MockUserStore;
    use crate::infrastructure::vault::MemoryKeyVault;

    fn runtime(config: AuthConfig) -> AuthRuntime {
        AuthRuntime::new(
            config,
            Arc::new(MockUserStore::new()),
            Arc::new(MemoryKeyVault::new()),
        )
    }

    #[tokio::test]
    async fn init_establishes_system_identity() {
        let rt = runtime(AuthConfig {
            domains: vec!["example.com".to_string()],
            ..AuthConfig::default()
        });

        rt.init().await.unwrap();
        let system = rt.system().unwrap();
        assert_eq!(system.global_id, "auth.example.com");

        // Idempotent: a second init resolves the same identity
        let first = system.local_id;
        rt.init().await.unwrap();
        assert_eq!(rt.system().unwrap().local_id, first);
    }

    #[tokio::test]
    async fn init_requires_a_domain() {
        let rt = runtime(AuthConfig::default());
        let err = rt.init().await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
