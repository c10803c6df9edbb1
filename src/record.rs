//! Raw mutation records as produced by a change-detection primitive.
//!
//! A primitive is lazy: it reports old values, never new ones. A single
//! `splice` record may describe several logical changes at once.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::container::{Key, Subject};
use crate::error::ObserveError;

/// Kind of a raw mutation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RawKind {
    /// A property was created.
    Add,
    /// A property was assigned.
    Update,
    /// A property was deleted.
    Delete,
    /// A property's attributes changed.
    Reconfigure,
    /// The prototype was replaced.
    SetPrototype,
    /// A list range was replaced.
    Splice,
}

impl RawKind {
    /// Kinds every record subscription must receive to resolve values.
    pub const RECORD_STANDARD: [Self; 3] = [Self::Add, Self::Update, Self::Delete];

    /// Name used by the primitive.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Reconfigure => "reconfigure",
            Self::SetPrototype => "setPrototype",
            Self::Splice => "splice",
        }
    }
}

impl fmt::Display for RawKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RawKind {
    type Err = ObserveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "reconfigure" => Ok(Self::Reconfigure),
            "setPrototype" => Ok(Self::SetPrototype),
            "splice" => Ok(Self::Splice),
            other => Err(ObserveError::InvalidEventType {
                token: other.to_string(),
            }),
        }
    }
}

/// Structural splice details carried by a `splice` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Splice {
    /// Where the splice starts.
    pub index: usize,
    /// Values removed, in order.
    pub removed: Vec<Value>,
    /// Number of values inserted at `index`.
    pub added_count: usize,
}

/// One low-level mutation notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Record kind.
    pub kind: RawKind,
    /// The mutated container.
    #[serde(skip_serializing)]
    pub subject: Subject,
    /// Mutated key; the splice start for splices.
    pub key: Key,
    /// Value before the mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Splice details, for `splice` records only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice: Option<Splice>,
}

impl RawRecord {
    /// A property was created.
    #[must_use]
    pub fn add(subject: Subject, key: impl Into<Key>) -> Self {
        Self::simple(RawKind::Add, subject, key.into(), None)
    }

    /// A property was assigned; `old_value` is what it replaced.
    #[must_use]
    pub fn update(subject: Subject, key: impl Into<Key>, old_value: Value) -> Self {
        Self::simple(RawKind::Update, subject, key.into(), Some(old_value))
    }

    /// A property was deleted.
    #[must_use]
    pub fn delete(subject: Subject, key: impl Into<Key>, old_value: Value) -> Self {
        Self::simple(RawKind::Delete, subject, key.into(), Some(old_value))
    }

    /// A property was reconfigured.
    #[must_use]
    pub fn reconfigure(subject: Subject, key: impl Into<Key>, old_value: Option<Value>) -> Self {
        Self::simple(RawKind::Reconfigure, subject, key.into(), old_value)
    }

    /// The prototype was replaced.
    #[must_use]
    pub fn set_prototype(subject: Subject, old_value: Option<Value>) -> Self {
        Self::simple(RawKind::SetPrototype, subject, Key::from("__proto__"), old_value)
    }

    /// A list splice at `index` removing `removed` and inserting `added_count` values.
    #[must_use]
    pub fn splice(subject: Subject, index: usize, removed: Vec<Value>, added_count: usize) -> Self {
        Self {
            kind: RawKind::Splice,
            subject,
            key: Key::Index(index),
            old_value: None,
            splice: Some(Splice {
                index,
                removed,
                added_count,
            }),
        }
    }

    fn simple(kind: RawKind, subject: Subject, key: Key, old_value: Option<Value>) -> Self {
        Self {
            kind,
            subject,
            key,
            old_value,
            splice: None,
        }
    }
}
