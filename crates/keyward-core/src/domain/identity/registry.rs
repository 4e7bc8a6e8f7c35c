//! Identity registry
//!
//! Maps global identifiers to stable local handles. Creation is
//! idempotent and race-safe: concurrent callers racing to register the
//! same global id all complete and agree on one `local_id`.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Scope;
use crate::domain::events::{EventKind, EventSubscriber, StoredEvent};
use crate::domain::identity::cache::UserProfileCache;
use crate::domain::identity::record::{
    FieldChanges, ProfilePatch, UserInfo, UserRecord, UserUpdate,
};
use crate::domain::identity::store::UserStore;
use crate::error::{Error, Result};

pub struct IdentityRegistry {
    store: Arc<dyn UserStore>,
    cache: Arc<UserProfileCache>,
    scope: Arc<Scope>,
}

impl IdentityRegistry {
    pub fn new(store: Arc<dyn UserStore>, cache: Arc<UserProfileCache>, scope: Arc<Scope>) -> Self {
        Self { store, cache, scope }
    }

    /// Ensure a user identity `name@domain` exists, returning its handle
    pub async fn ensure_user(&self, name: &str, domain: &str) -> Result<Uuid> {
        let global_id = format!("{name}@{domain}");
        self.ensure(&global_id, domain, false).await
    }

    /// Ensure a service identity `name.domain` exists, returning its handle
    pub async fn ensure_service(&self, name: &str, domain: &str) -> Result<Uuid> {
        let global_id = format!("{name}.{domain}");
        self.ensure(&global_id, domain, true).await
    }

    /// Idempotent ensure-or-create.
    ///
    /// Optimistic insert with a bounded fallback: on a duplicate-key
    /// conflict (another caller won the race) the select is retried
    /// exactly once, never in a loop.
    pub async fn ensure(&self, global_id: &str, domain: &str, is_service: bool) -> Result<Uuid> {
        if let Some(local_id) = self.store.select_by_global_id(global_id).await? {
            return Ok(local_id);
        }

        let is_local = self.scope.config().is_local_domain(domain);
        let record = UserRecord::new(global_id, is_local, is_service);
        let event = StoredEvent::new(
            EventKind::UsrNew,
            serde_json::json!({
                "local_id": record.local_id,
                "global_id": record.global_id,
                "is_local": record.is_local,
                "is_service": record.is_service,
            }),
        );

        match self.store.insert_user(&record, &event).await {
            Ok(()) => {
                tracing::info!(global_id, local_id = %record.local_id, "identity created");
                Ok(record.local_id)
            }
            Err(Error::Duplicate(_)) => {
                // Lost the creation race; the winner's row must be visible now
                match self.store.select_by_global_id(global_id).await? {
                    Some(local_id) => Ok(local_id),
                    None => Err(Error::Internal(format!(
                        "duplicate insert for '{global_id}' but no row found on retry"
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a resolved identity record, populating the cache on miss
    pub async fn get_user_info(&self, local_id: Uuid) -> Result<UserInfo> {
        if let Some(info) = self.cache.get(local_id) {
            return Ok(info);
        }

        let record = self
            .store
            .select_by_local_id(local_id)
            .await?
            .ok_or_else(|| Error::UnknownUser(local_id.to_string()))?;

        let info = record.resolve(&self.scope.config());
        self.cache.put(info.clone());
        Ok(info)
    }

    /// Apply an administrative update to the mutable identity fields.
    ///
    /// Incoming quota values equal to the class default are normalized to
    /// "unset" before storage. Only genuinely changed fields are written
    /// and carried on the `USR_MOD` event; the profile cache is patched
    /// synchronously with the same field set.
    pub async fn set_user_info(&self, local_id: Uuid, update: UserUpdate) -> Result<()> {
        let record = self
            .store
            .select_by_local_id(local_id)
            .await?
            .ok_or_else(|| Error::UnknownUser(local_id.to_string()))?;

        let config = self.scope.config();
        let def_ms = config.default_ms_max(record.is_service);
        let def_ds = config.default_ds_max(record.is_service);

        let mut changes = FieldChanges::default();
        let mut patch = ProfilePatch::default();

        if let Some(is_enabled) = update.is_enabled {
            if is_enabled != record.is_enabled {
                changes.is_enabled = Some(is_enabled);
                patch.is_enabled = Some(is_enabled);
            }
        }
        if let Some(ms_max) = update.ms_max {
            let stored = if ms_max == def_ms { None } else { Some(ms_max) };
            if stored != record.ms_max {
                changes.ms_max = Some(stored);
                patch.ms_max = Some(ms_max);
            }
        }
        if let Some(ds_max) = update.ds_max {
            let stored = if ds_max == def_ds { None } else { Some(ds_max) };
            if stored != record.ds_max {
                changes.ds_max = Some(stored);
                patch.ds_max = Some(ds_max);
            }
        }

        if changes.is_empty() {
            return Ok(());
        }

        let mut data = serde_json::to_value(&patch)
            .map_err(|e| Error::Internal(format!("patch serialization: {e}")))?;
        data["local_id"] = serde_json::json!(local_id);
        let event = StoredEvent::new(EventKind::UsrMod, data);

        self.store
            .update_user(local_id, &changes, Utc::now(), &event)
            .await?;

        tracing::info!(local_id = %local_id, "identity updated");
        self.cache.patch(local_id, &patch);
        Ok(())
    }

    /// Fail unless the identity exists and is enabled.
    ///
    /// Shared precondition of every key operation acting on behalf of an
    /// identity.
    pub async fn check_enabled(&self, local_id: Uuid) -> Result<UserInfo> {
        let info = self
            .get_user_info(local_id)
            .await
            .map_err(|e| match e {
                Error::UnknownUser(id) => {
                    Error::security(format!("Invalid user or password: {id}"))
                }
                other => other,
            })?;

        if !info.is_enabled {
            return Err(Error::security(format!(
                "User is not enabled: {local_id}"
            )));
        }

        Ok(info)
    }
}

/// Event subscriber that patches the profile cache on `USR_MOD`.
///
/// Handles events arriving out-of-band from the push subsystem; the
/// write path that originated the change has already patched the cache
/// synchronously, so duplicate delivery is harmless (field-level last
/// writer wins).
pub struct ProfileCacheSubscriber {
    cache: Arc<UserProfileCache>,
}

impl ProfileCacheSubscriber {
    pub fn new(cache: Arc<UserProfileCache>) -> Self {
        Self { cache }
    }
}

#[async_trait::async_trait]
impl EventSubscriber for ProfileCacheSubscriber {
    fn wants(&self) -> &[EventKind] {
        const WANTED: &[EventKind] = &[EventKind::UsrMod];
        WANTED
    }

    async fn handle(&self, event: &StoredEvent) {
        let Some(local_id) = event
            .data
            .get("local_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            tracing::warn!(kind = %event.kind, "event without parsable local_id ignored");
            return;
        };

        let patch: ProfilePatch = match serde_json::from_value(event.data.clone()) {
            Ok(patch) => patch,
            Err(e) => {
                tracing::warn!(error = %e, "malformed USR_MOD payload ignored");
                return;
            }
        };

        self.cache.patch(local_id, &patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::domain::identity::testing::MockUserStore;
    use std::time::Duration;

    fn scope() -> Arc<Scope> {
        Arc::new(Scope::new(AuthConfig {
            domains: vec!["example.com".to_string()],
            ..AuthConfig::default()
        }))
    }

    fn registry(store: Arc<MockUserStore>) -> IdentityRegistry {
        let cache = Arc::new(UserProfileCache::new(64, Duration::from_secs(60)));
        IdentityRegistry::new(store, cache, scope())
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let store = Arc::new(MockUserStore::new());
        let reg = registry(store.clone());

        let first = reg.ensure_user("user1", "example.org").await.unwrap();
        let second = reg.ensure_user("user1", "example.org").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.event_count(), 1);
    }

    #[tokio::test]
    async fn ensure_distinguishes_domains() {
        let store = Arc::new(MockUserStore::new());
        let reg = registry(store);

        let a = reg.ensure_user("user1", "example.org").await.unwrap();
        let b = reg.ensure_user("user1", "example.com").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn lost_race_recovers_with_single_retry() {
        let store = Arc::new(MockUserStore::new());
        // Simulate another caller winning between our select and insert
        store.inject_duplicate_once("user1@example.com");
        let reg = registry(store.clone());

        let id = reg.ensure_user("user1", "example.com").await.unwrap();
        assert_eq!(id, store.select_id("user1@example.com").unwrap());
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn pathological_race_surfaces_internal_error() {
        let store = Arc::new(MockUserStore::new());
        store.inject_duplicate_always("ghost@example.com");
        let reg = registry(store);

        let err = reg.ensure_user("ghost", "example.com").await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn get_user_info_unknown_embeds_id() {
        let store = Arc::new(MockUserStore::new());
        let reg = registry(store);

        let missing = Uuid::new_v4();
        let err = reg.get_user_info(missing).await.unwrap_err();
        assert!(err.to_string().contains(&missing.to_string()));
    }

    #[tokio::test]
    async fn set_user_info_normalizes_defaults() {
        let store = Arc::new(MockUserStore::new());
        let reg = registry(store.clone());
        let config = AuthConfig::default();

        let id = reg.ensure_user("user1", "example.com").await.unwrap();

        // Setting the class default must round-trip without storing a literal
        reg.set_user_info(
            id,
            UserUpdate {
                ms_max: Some(config.def_user_ms_max),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

        let raw = store.raw_record(id).unwrap();
        assert_eq!(raw.ms_max, None);
        let info = reg.get_user_info(id).await.unwrap();
        assert_eq!(info.ms_max, config.def_user_ms_max);

        // A non-default value is stored literally
        reg.set_user_info(
            id,
            UserUpdate {
                ms_max: Some(5),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(store.raw_record(id).unwrap().ms_max, Some(5));
        assert_eq!(reg.get_user_info(id).await.unwrap().ms_max, 5);
    }

    #[tokio::test]
    async fn set_user_info_without_change_is_noop() {
        let store = Arc::new(MockUserStore::new());
        let reg = registry(store.clone());

        let id = reg.ensure_user("user1", "example.com").await.unwrap();
        let before = store.event_count();

        reg.set_user_info(
            id,
            UserUpdate {
                is_enabled: Some(true),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(store.event_count(), before);
    }

    #[tokio::test]
    async fn set_user_info_patches_cache_synchronously() {
        let store = Arc::new(MockUserStore::new());
        let cache = Arc::new(UserProfileCache::new(64, Duration::from_secs(60)));
        let reg = IdentityRegistry::new(store, cache.clone(), scope());

        let id = reg.ensure_user("user1", "example.com").await.unwrap();
        reg.get_user_info(id).await.unwrap();
        assert!(cache.get(id).unwrap().is_enabled);

        reg.set_user_info(
            id,
            UserUpdate {
                is_enabled: Some(false),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

        assert!(!cache.get(id).unwrap().is_enabled);
    }

    #[tokio::test]
    async fn check_enabled_rejects_disabled_identity() {
        let store = Arc::new(MockUserStore::new());
        let reg = registry(store);

        let id = reg.ensure_user("user1", "example.com").await.unwrap();
        reg.check_enabled(id).await.unwrap();

        reg.set_user_info(
            id,
            UserUpdate {
                is_enabled: Some(false),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();

        let err = reg.check_enabled(id).await.unwrap_err();
        assert!(matches!(err, Error::Security(_)));
    }
}
