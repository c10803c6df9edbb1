//! Subscription contexts and handler dispatch.
//!
//! A [`DispatchEmitter`] owns the handlers registered for one observation
//! context and drives the context lifecycle: attached to the change
//! primitive after `enable()`, detached after `disable()`, gone for good
//! after `destroy()`.

/// Context lifecycle and event dispatch.
pub mod emitter;
/// Handler registrations and event-type filters.
pub mod filter;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

pub use emitter::DispatchEmitter;
pub use filter::{Registration, TypeEntry};

/// A handler invoked synchronously for each matching event.
///
/// Identity is the allocation: registering the same `Handler` again merges
/// into its existing registration.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure as a [`Handler`].
pub fn handler(f: impl Fn(&Event) + Send + Sync + 'static) -> Handler {
    Arc::new(f)
}

/// Unique identifier for an observation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Create a new random context id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
