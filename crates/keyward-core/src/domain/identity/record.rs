//! Identity records
//!
//! A row as stored keeps quota fields as `Option<u32>`: `None` means "use
//! the class default", so administrative defaults can be changed globally
//! without touching every row. Resolved views substitute the defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Identity record as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Opaque stable handle, generated once and immutable
    pub local_id: Uuid,
    /// Globally unique identifier, `user@domain` or `host.domain`
    pub global_id: String,
    /// Whether the identity belongs to a locally served domain
    pub is_local: bool,
    /// Service identity (vs end user)
    pub is_service: bool,
    /// Disabled identities fail every authentication path
    pub is_enabled: bool,
    /// Master key quota override, `None` = class default
    pub ms_max: Option<u32>,
    /// Derived key quota override, `None` = class default
    pub ds_max: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(global_id: impl Into<String>, is_local: bool, is_service: bool) -> Self {
        let now = Utc::now();
        Self {
            local_id: Uuid::new_v4(),
            global_id: global_id.into(),
            is_local,
            is_service,
            is_enabled: true,
            ms_max: None,
            ds_max: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolved view with class defaults substituted
    pub fn resolve(&self, config: &AuthConfig) -> UserInfo {
        UserInfo {
            local_id: self.local_id,
            global_id: self.global_id.clone(),
            is_local: self.is_local,
            is_service: self.is_service,
            is_enabled: self.is_enabled,
            ms_max: self
                .ms_max
                .unwrap_or_else(|| config.default_ms_max(self.is_service)),
            ds_max: self
                .ds_max
                .unwrap_or_else(|| config.default_ds_max(self.is_service)),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Resolved identity view returned by `get_user_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub local_id: Uuid,
    pub global_id: String,
    pub is_local: bool,
    pub is_service: bool,
    pub is_enabled: bool,
    /// Effective master key quota
    pub ms_max: u32,
    /// Effective derived key quota
    pub ds_max: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Administrative update for the mutable identity fields
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub is_enabled: Option<bool>,
    pub ms_max: Option<u32>,
    pub ds_max: Option<u32>,
}

/// Changed-field set carried by `USR_MOD` events and cache patches.
///
/// Quota values are effective (defaults already substituted) so consumers
/// need no config knowledge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_max: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ds_max: Option<u32>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.is_enabled.is_none() && self.ms_max.is_none() && self.ds_max.is_none()
    }
}

/// Stored-field changes paired with the patch they imply
#[derive(Debug, Clone, Default)]
pub struct FieldChanges {
    /// New stored value for `is_enabled`, if changed
    pub is_enabled: Option<bool>,
    /// New stored value for `ms_max`, if changed (`Some(None)` = reset to default)
    pub ms_max: Option<Option<u32>>,
    /// New stored value for `ds_max`, if changed
    pub ds_max: Option<Option<u32>>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.is_enabled.is_none() && self.ms_max.is_none() && self.ds_max.is_none()
    }
}

/// Ephemeral result of every successful authentication path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub local_id: Uuid,
    pub global_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_substitutes_class_defaults() {
        let config = AuthConfig::default();

        let user = UserRecord::new("user1@example.com", true, false);
        let info = user.resolve(&config);
        assert_eq!(info.ms_max, config.def_user_ms_max);
        assert_eq!(info.ds_max, config.def_user_ds_max);

        let mut service = UserRecord::new("svc1.example.com", true, true);
        service.ms_max = Some(3);
        let info = service.resolve(&config);
        assert_eq!(info.ms_max, 3);
        assert_eq!(info.ds_max, config.def_service_ds_max);
    }

    #[test]
    fn patch_serialization_skips_absent_fields() {
        let patch = ProfilePatch {
            is_enabled: Some(false),
            ..ProfilePatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"is_enabled": false}));
    }
}
