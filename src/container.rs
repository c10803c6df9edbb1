//! Observed containers.
//!
//! The core never owns or mutates a container. It only needs to know the
//! container's structural kind, read its current values, and obtain the
//! native change-detection primitive when one exists.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::ChangePrimitive;

/// Structural kind of an observed container, fixed at context creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Structure {
    /// Key-value record; keys are stable property names.
    Record,
    /// Ordered list; keys are indices that shift on insertion and removal.
    List,
}

impl Structure {
    /// Whether keys are list indices.
    #[must_use]
    pub const fn is_list(self) -> bool {
        matches!(self, Self::List)
    }
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => write!(f, "record"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Key of a value inside a container: a property name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Position in a list.
    Index(usize),
    /// Property name in a record.
    Name(String),
}

impl Key {
    /// Interprets the key as a list index. Textual indices are parsed.
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(s) => s.trim().parse().ok(),
        }
    }

    /// The property name, if this is a named key.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Name(s) => Some(s),
            Self::Index(_) => None,
        }
    }

    /// Coerces the key to the representation used by `structure`.
    #[must_use]
    pub fn coerce(self, structure: Structure) -> Self {
        match (structure, self) {
            (Structure::List, Self::Name(s)) => match s.trim().parse() {
                Ok(i) => Self::Index(i),
                Err(_) => Self::Name(s),
            },
            (Structure::Record, Self::Index(i)) => Self::Name(i.to_string()),
            (_, key) => key,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Name(s) => write!(f, "{s}"),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Name(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Name(s)
    }
}

/// A container that can be observed.
///
/// Implementations must be cheap to read; `get` is called during value
/// resolution for every event whose value is not found later in the batch.
pub trait Observable: Send + Sync {
    /// Structural kind of this container. Must never change.
    fn structure(&self) -> Structure;

    /// Current value at `key`, `None` when absent.
    fn get(&self, key: &Key) -> Option<Value>;

    /// Current keys, in container order.
    fn keys(&self) -> Vec<Key>;

    /// The built-in change-detection primitive, if the container has one.
    fn native_primitive(&self) -> Option<Arc<dyn ChangePrimitive>> {
        None
    }
}

/// Identity of an observed container (reference equality, never structural).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "container@{:#x}", self.0)
    }
}

/// Shared handle to an observed container.
///
/// Equality is reference equality: two subjects are equal only when they
/// point at the same container.
#[derive(Clone)]
pub struct Subject(Arc<dyn Observable>);

impl Subject {
    /// Wraps a shared container.
    #[must_use]
    pub fn new(container: Arc<dyn Observable>) -> Self {
        Self(container)
    }

    /// Identity of the underlying container.
    #[must_use]
    pub fn id(&self) -> ContainerId {
        ContainerId(Arc::as_ptr(&self.0).cast::<()>() as usize)
    }

    /// Structural kind of the container.
    #[must_use]
    pub fn structure(&self) -> Structure {
        self.0.structure()
    }

    /// Current value at `key`.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.0.get(key)
    }

    /// Current keys, in container order.
    #[must_use]
    pub fn keys(&self) -> Vec<Key> {
        self.0.keys()
    }

    /// The container's own change primitive, if any.
    #[must_use]
    pub fn native_primitive(&self) -> Option<Arc<dyn ChangePrimitive>> {
        self.0.native_primitive()
    }

    /// Borrow the underlying container.
    #[must_use]
    pub fn container(&self) -> &Arc<dyn Observable> {
        &self.0
    }
}

impl<T: Observable + 'static> From<Arc<T>> for Subject {
    fn from(container: Arc<T>) -> Self {
        Self(container)
    }
}

impl PartialEq for Subject {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Subject {}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("id", &self.id())
            .field("structure", &self.structure())
            .finish()
    }
}
