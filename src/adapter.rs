//! Contract required from the host environment.
//!
//! A [`ChangePrimitive`] turns container mutations into raw record batches,
//! delivered asynchronously once per host turn. A [`Scheduler`] runs work
//! after the current delivery turn and before the next one.

use std::fmt;
use std::sync::Arc;

use crate::container::Subject;
use crate::error::{ObserveError, ObserveResult};
use crate::record::{RawKind, RawRecord};

/// Receives one raw record batch per delivery. Batches are never empty.
pub type DeliveryCallback = Arc<dyn Fn(Vec<RawRecord>) + Send + Sync>;

/// Deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Opaque handle of one primitive subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveHandle(u64);

impl PrimitiveHandle {
    /// Wraps a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PrimitiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "primitive#{}", self.0)
    }
}

/// Change-detection primitive for one structural kind.
pub trait ChangePrimitive: Send + Sync {
    /// Registers `callback` for raw batches about `subject`.
    ///
    /// `kind_filter` restricts the record kinds delivered; `None` means all.
    fn begin_observing(
        &self,
        subject: &Subject,
        callback: DeliveryCallback,
        kind_filter: Option<&[RawKind]>,
    ) -> ObserveResult<PrimitiveHandle>;

    /// Unregisters the subscription. Buffered records are discarded.
    fn end_observing(&self, subject: &Subject, handle: PrimitiveHandle);

    /// Synchronously delivers buffered records for `handle` before returning.
    ///
    /// # Errors
    /// `FlushUnavailable` when the primitive cannot flush synchronously.
    fn flush_pending(&self, handle: PrimitiveHandle) -> ObserveResult<()> {
        let _ = handle;
        Err(ObserveError::FlushUnavailable)
    }
}

/// Runs tasks after the current delivery turn, before the next.
pub trait Scheduler: Send + Sync {
    fn defer(&self, task: Task);
}
