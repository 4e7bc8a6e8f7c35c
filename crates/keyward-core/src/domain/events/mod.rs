//! Append-only event stream
//!
//! Every identity and key lifecycle change emits an event for downstream
//! replication and auditing. Delivery is at-least-once and fire-and-forget;
//! ordering relative to the emitter's own subsequent reads is not
//! guaranteed, so subscribers must tolerate late and duplicate delivery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::Result;

/// Event kinds carried on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Identity created
    UsrNew,
    /// Identity fields updated
    UsrMod,
    /// Master key generated
    MstrNew,
    /// Master key wiped
    MstrDel,
    /// Stateless secret generated
    StlsNew,
    /// Stateless secret removed
    StlsDel,
}

impl EventKind {
    /// Canonical wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UsrNew => "USR_NEW",
            Self::UsrMod => "USR_MOD",
            Self::MstrNew => "MSTR_NEW",
            Self::MstrDel => "MSTR_DEL",
            Self::StlsNew => "STLS_NEW",
            Self::StlsDel => "STLS_DEL",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Event kind
    pub kind: EventKind,
    /// Event payload (never contains secret material)
    pub data: serde_json::Value,
    /// When the event was created
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            data,
            created_at: Utc::now(),
        }
    }
}

/// Publisher side of the event stream
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Emit an event. Fire-and-forget from the caller's perspective.
    async fn emit(&self, kind: EventKind, data: serde_json::Value) -> Result<()>;
}

/// Subscriber callback for event kinds the core cares about
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Event kinds this subscriber wants
    fn wants(&self) -> &[EventKind];

    /// Handle a delivered event
    async fn handle(&self, event: &StoredEvent);
}

/// In-process event bus: records events and fans them out to subscribers.
///
/// Stands in for the durable event-push subsystem in tests and single
/// process deployments.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: RwLock<Vec<StoredEvent>>,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(subscriber);
    }

    /// All recorded events
    pub fn all_events(&self) -> Vec<StoredEvent> {
        self.events.read().expect("event lock poisoned").clone()
    }

    /// Recorded events of one kind
    pub fn events_by_kind(&self, kind: EventKind) -> Vec<StoredEvent> {
        self.events
            .read()
            .expect("event lock poisoned")
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Deliver an already-recorded event to interested subscribers.
    ///
    /// Used by stores that persist events transactionally themselves and
    /// only need the fan-out.
    pub async fn dispatch(&self, event: &StoredEvent) {
        let subscribers = {
            self.subscribers
                .read()
                .expect("subscriber lock poisoned")
                .clone()
        };

        for sub in subscribers {
            if sub.wants().contains(&event.kind) {
                sub.handle(event).await;
            }
        }
    }

    /// Record and dispatch in one step
    pub async fn record(&self, event: StoredEvent) {
        self.events
            .write()
            .expect("event lock poisoned")
            .push(event.clone());
        self.dispatch(&event).await;
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn emit(&self, kind: EventKind, data: serde_json::Value) -> Result<()> {
        tracing::debug!(kind = %kind, "event emitted");
        self.record(StoredEvent::new(kind, data)).await;
        Ok(())
    }
}
