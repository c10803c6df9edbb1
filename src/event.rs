//! Semantic change events delivered to handlers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::{Key, Subject};
use crate::error::ObserveError;
use crate::record::RawRecord;

/// Kind of a normalized change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// A value appeared.
    Add,
    /// A value was replaced.
    Update,
    /// A value disappeared.
    Remove,
    /// A property's attributes changed.
    Reconfigure,
    /// The record's prototype changed.
    SetPrototype,
}

impl ChangeKind {
    /// Add and update events carry a resolvable `value`.
    #[must_use]
    pub const fn carries_value(self) -> bool {
        matches!(self, Self::Add | Self::Update)
    }
}

/// Event type used by handler filters. `Batch` is the synthetic per-delivery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    /// The per-delivery batch event.
    Batch,
    /// See [`ChangeKind::Add`].
    Add,
    /// See [`ChangeKind::Update`].
    Update,
    /// See [`ChangeKind::Remove`].
    Remove,
    /// See [`ChangeKind::Reconfigure`].
    Reconfigure,
    /// See [`ChangeKind::SetPrototype`].
    SetPrototype,
}

impl EventType {
    /// Token used in handler filters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Reconfigure => "reconfigure",
            Self::SetPrototype => "setPrototype",
        }
    }

    /// The change kind for this type; `None` for `Batch`.
    #[must_use]
    pub const fn change_kind(self) -> Option<ChangeKind> {
        match self {
            Self::Batch => None,
            Self::Add => Some(ChangeKind::Add),
            Self::Update => Some(ChangeKind::Update),
            Self::Remove => Some(ChangeKind::Remove),
            Self::Reconfigure => Some(ChangeKind::Reconfigure),
            Self::SetPrototype => Some(ChangeKind::SetPrototype),
        }
    }
}

impl From<ChangeKind> for EventType {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Add => Self::Add,
            ChangeKind::Update => Self::Update,
            ChangeKind::Remove => Self::Remove,
            ChangeKind::Reconfigure => Self::Reconfigure,
            ChangeKind::SetPrototype => Self::SetPrototype,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ObserveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(Self::Batch),
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "remove" => Ok(Self::Remove),
            "reconfigure" => Ok(Self::Reconfigure),
            "setPrototype" => Ok(Self::SetPrototype),
            other => Err(ObserveError::InvalidEventType {
                token: other.to_string(),
            }),
        }
    }
}

/// One logical change to one key.
///
/// For list containers `key` is the index at the time the event is
/// interpreted, in batch order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// Where it happened.
    pub key: Key,
    /// The container the event is about.
    #[serde(skip_serializing)]
    pub subject: Subject,
    /// Value before the change, as reported by the primitive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Value after the change; `None` when unresolved or dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ChangeEvent {
    /// An event with no values yet.
    #[must_use]
    pub fn new(kind: ChangeKind, key: Key, subject: Subject) -> Self {
        Self {
            kind,
            key,
            subject,
            old_value: None,
            value: None,
        }
    }

    /// Sets `old_value`.
    #[must_use]
    pub fn with_old_value(mut self, old_value: Option<Value>) -> Self {
        self.old_value = old_value;
        self
    }

    /// Sets `value`.
    #[must_use]
    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    /// List index of this event, if the key is an index.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self.key {
            Key::Index(i) => Some(i),
            Key::Name(_) => None,
        }
    }
}

/// The synthetic event emitted once per delivery, before the computed events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEvent {
    /// The container the batch is about.
    #[serde(skip_serializing)]
    pub subject: Subject,
    /// The raw records as delivered (empty for manual triggers).
    pub raw: Arc<[RawRecord]>,
    /// The final computed event list.
    pub computed: Arc<[ChangeEvent]>,
    /// When the batch was handed to the handlers.
    pub delivered_at: DateTime<Utc>,
}

/// An event as seen by handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The synthetic per-delivery event.
    Batch(BatchEvent),
    /// One computed change.
    Change(ChangeEvent),
}

impl Event {
    /// Type used for filter matching.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Batch(_) => EventType::Batch,
            Self::Change(e) => e.kind.into(),
        }
    }

    /// Key of a change event; `None` for the batch event.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::Batch(_) => None,
            Self::Change(e) => Some(&e.key),
        }
    }

    /// The container the event is about.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        match self {
            Self::Batch(b) => &b.subject,
            Self::Change(e) => &e.subject,
        }
    }

    /// The batch payload, if this is the batch event.
    #[must_use]
    pub fn as_batch(&self) -> Option<&BatchEvent> {
        match self {
            Self::Batch(b) => Some(b),
            Self::Change(_) => None,
        }
    }

    /// The change payload, if this is a change event.
    #[must_use]
    pub fn as_change(&self) -> Option<&ChangeEvent> {
        match self {
            Self::Batch(_) => None,
            Self::Change(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_str() {
        for t in [
            EventType::Batch,
            EventType::Add,
            EventType::Update,
            EventType::Remove,
            EventType::Reconfigure,
            EventType::SetPrototype,
        ] {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("delete".parse::<EventType>().is_err());
    }

    #[test]
    fn batch_has_no_change_kind() {
        assert_eq!(EventType::Batch.change_kind(), None);
        assert_eq!(EventType::Remove.change_kind(), Some(ChangeKind::Remove));
        assert!(ChangeKind::Update.carries_value());
        assert!(!ChangeKind::Remove.carries_value());
    }
}
