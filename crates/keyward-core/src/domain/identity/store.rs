//! Storage seam for identity records
//!
//! The relational backend is an external collaborator; the core consumes
//! it through this trait. Implementations must keep the paired event
//! atomic with the row change: an aborted transaction produces no visible
//! row and no visible event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::events::StoredEvent;
use crate::domain::identity::record::{FieldChanges, UserRecord};
use crate::error::Result;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up an identity's stable handle by its global id
    async fn select_by_global_id(&self, global_id: &str) -> Result<Option<Uuid>>;

    /// Fetch the raw stored record
    async fn select_by_local_id(&self, local_id: Uuid) -> Result<Option<UserRecord>>;

    /// Insert a new identity row together with its creation event.
    ///
    /// Returns [`crate::Error::Duplicate`] when another caller already
    /// registered the same `global_id`.
    async fn insert_user(&self, record: &UserRecord, event: &StoredEvent) -> Result<()>;

    /// Apply field changes to an existing row together with the update
    /// event.
    async fn update_user(
        &self,
        local_id: Uuid,
        changes: &FieldChanges,
        now: DateTime<Utc>,
        event: &StoredEvent,
    ) -> Result<()>;
}
