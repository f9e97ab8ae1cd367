//! Repository lifecycle events.
//!
//! # Responsibility
//! - Name and carry `<prefix><entity>_created|updated|deleted` events.
//! - Dispatch them in-process to listeners registered by event name.
//!
//! # Invariants
//! - In-process dispatch is fire-and-forget: listeners cannot fail a write.
//! - Durable delivery goes through the outbox (`events::outbox`) instead.

pub mod outbox;

use crate::model::record::{record_to_json, Record};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// One lifecycle event emitted after a successful repository write.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryEvent {
    /// Full event name, e.g. `money_quiz_prospect_created`.
    pub name: String,
    pub kind: EventKind,
    pub entity: String,
    pub id: i64,
    /// Written data for `Created`/`Updated`, `None` for `Deleted`.
    pub data: Option<Record>,
    /// Prior row for `Updated`/`Deleted` when it could be read.
    pub previous: Option<Record>,
}

impl RepositoryEvent {
    pub fn created(prefix: &str, entity: &str, id: i64, data: Record) -> Self {
        Self::build(prefix, entity, EventKind::Created, id, Some(data), None)
    }

    pub fn updated(
        prefix: &str,
        entity: &str,
        id: i64,
        data: Record,
        previous: Option<Record>,
    ) -> Self {
        Self::build(prefix, entity, EventKind::Updated, id, Some(data), previous)
    }

    pub fn deleted(prefix: &str, entity: &str, id: i64, previous: Option<Record>) -> Self {
        Self::build(prefix, entity, EventKind::Deleted, id, None, previous)
    }

    fn build(
        prefix: &str,
        entity: &str,
        kind: EventKind,
        id: i64,
        data: Option<Record>,
        previous: Option<Record>,
    ) -> Self {
        Self {
            name: format!("{prefix}{entity}_{}", kind.verb()),
            kind,
            entity: entity.to_string(),
            id,
            data,
            previous,
        }
    }

    /// JSON payload persisted in the outbox.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind.verb(),
            "entity": self.entity,
            "id": self.id,
            "data": self.data.as_ref().map(record_to_json),
            "previous": self.previous.as_ref().map(record_to_json),
        })
    }
}

/// Receiver of lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RepositoryEvent);
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &RepositoryEvent) {}
}

type Listener = Arc<dyn Fn(&RepositoryEvent) + Send + Sync>;

/// Synchronous in-process dispatcher keyed by event name.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<BTreeMap<String, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events named exactly `event_name`.
    pub fn listen<F>(&self, event_name: impl Into<String>, listener: F)
    where
        F: Fn(&RepositoryEvent) + Send + Sync + 'static,
    {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners
            .entry(event_name.into())
            .or_default()
            .push(Arc::new(listener));
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        match self.listeners.read() {
            Ok(guard) => guard.get(event_name).map_or(0, Vec::len),
            Err(poisoned) => poisoned.into_inner().get(event_name).map_or(0, Vec::len),
        }
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: &RepositoryEvent) {
        // Clone the handles so listeners may register more listeners.
        let listeners = {
            let guard = match self.listeners.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.get(&event.name).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener(event);
        }
    }
}
