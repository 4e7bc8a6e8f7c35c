//! In-memory UserStore mock shared by unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::events::StoredEvent;
use crate::domain::identity::record::{FieldChanges, UserRecord};
use crate::domain::identity::store::UserStore;
use crate::error::{Error, Result};

#[derive(Default)]
struct MockState {
    users: HashMap<Uuid, UserRecord>,
    by_global: HashMap<String, Uuid>,
    events: Vec<StoredEvent>,
    duplicate_once: Vec<String>,
    duplicate_always: Vec<String>,
}

/// Mock store with duplicate-race injection hooks
#[derive(Default)]
pub struct MockUserStore {
    state: Mutex<MockState>,
}

impl MockUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next insert for this global id fails with Duplicate, but the row
    /// appears as if another caller committed it first.
    pub fn inject_duplicate_once(&self, global_id: &str) {
        self.state
            .lock()
            .unwrap()
            .duplicate_once
            .push(global_id.to_string());
    }

    /// Every insert for this global id fails with Duplicate and no row
    /// ever appears (pathological race).
    pub fn inject_duplicate_always(&self, global_id: &str) {
        self.state
            .lock()
            .unwrap()
            .duplicate_always
            .push(global_id.to_string());
    }

    pub fn user_count(&self) -> usize {
        self.state.lock().unwrap().users.len()
    }

    pub fn event_count(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn select_id(&self, global_id: &str) -> Option<Uuid> {
        self.state.lock().unwrap().by_global.get(global_id).copied()
    }

    pub fn raw_record(&self, local_id: Uuid) -> Option<UserRecord> {
        self.state.lock().unwrap().users.get(&local_id).cloned()
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn select_by_global_id(&self, global_id: &str) -> Result<Option<Uuid>> {
        Ok(self.select_id(global_id))
    }

    async fn select_by_local_id(&self, local_id: Uuid) -> Result<Option<UserRecord>> {
        Ok(self.raw_record(local_id))
    }

    async fn insert_user(&self, record: &UserRecord, event: &StoredEvent) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.duplicate_always.contains(&record.global_id) {
            return Err(Error::Duplicate(record.global_id.clone()));
        }

        if let Some(pos) = state
            .duplicate_once
            .iter()
            .position(|g| g == &record.global_id)
        {
            state.duplicate_once.remove(pos);
            // The racing winner's row, with a different local id
            let winner = UserRecord {
                local_id: Uuid::new_v4(),
                ..record.clone()
            };
            state.by_global.insert(winner.global_id.clone(), winner.local_id);
            state.users.insert(winner.local_id, winner);
            return Err(Error::Duplicate(record.global_id.clone()));
        }

        if state.by_global.contains_key(&record.global_id) {
            return Err(Error::Duplicate(record.global_id.clone()));
        }

        state
            .by_global
            .insert(record.global_id.clone(), record.local_id);
        state.users.insert(record.local_id, record.clone());
        state.events.push(event.clone());
        Ok(())
    }

    async fn update_user(
        &self,
        local_id: Uuid,
        changes: &FieldChanges,
        now: DateTime<Utc>,
        event: &StoredEvent,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .users
            .get_mut(&local_id)
            .ok_or_else(|| Error::UnknownUser(local_id.to_string()))?;

        if let Some(is_enabled) = changes.is_enabled {
            record.is_enabled = is_enabled;
        }
        if let Some(ms_max) = changes.ms_max {
            record.ms_max = ms_max;
        }
        if let Some(ds_max) = changes.ds_max {
            record.ds_max = ds_max;
        }
        record.updated_at = now;

        state.events.push(event.clone());
        Ok(())
    }
}
