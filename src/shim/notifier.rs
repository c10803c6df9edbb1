//! Per-container change notifier.
//!
//! Buffers raw records per subscription and schedules one delivery on the
//! host whenever a subscription's buffer goes from empty to non-empty, so
//! every mutation made during a turn arrives in a single batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::adapter::{ChangePrimitive, DeliveryCallback, PrimitiveHandle, Scheduler};
use crate::container::Subject;
use crate::error::{lock_err, ObserveResult};
use crate::record::{RawKind, RawRecord};

struct Outlet {
    handle: PrimitiveHandle,
    callback: DeliveryCallback,
    kinds: Option<Vec<RawKind>>,
    pending: Vec<RawRecord>,
}

impl Outlet {
    fn accepts(&self, kind: RawKind) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&kind))
    }
}

/// Pending records of every subscription of one primitive.
#[derive(Default)]
pub(crate) struct Outbox {
    outlets: Vec<Outlet>,
}

impl Outbox {
    pub(crate) fn add(&mut self, handle: PrimitiveHandle, callback: DeliveryCallback, kinds: Option<&[RawKind]>) {
        self.outlets.push(Outlet {
            handle,
            callback,
            kinds: kinds.map(<[RawKind]>::to_vec),
            pending: Vec::new(),
        });
    }

    pub(crate) fn remove(&mut self, handle: PrimitiveHandle) -> bool {
        let before = self.outlets.len();
        self.outlets.retain(|o| o.handle != handle);
        self.outlets.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.outlets.len()
    }

    /// Buffers `records` for every outlet that accepts them.
    ///
    /// Returns the handles whose buffer was empty before, which need a
    /// delivery scheduled.
    pub(crate) fn enqueue(&mut self, records: &[RawRecord]) -> Vec<PrimitiveHandle> {
        self.outlets
            .iter_mut()
            .filter_map(|outlet| push_accepted(outlet, records).then_some(outlet.handle))
            .collect()
    }

    /// Like [`Outbox::enqueue`] for a single outlet.
    pub(crate) fn enqueue_for(&mut self, handle: PrimitiveHandle, records: &[RawRecord]) -> bool {
        self.outlets
            .iter_mut()
            .find(|o| o.handle == handle)
            .is_some_and(|outlet| push_accepted(outlet, records))
    }

    /// Takes the buffered batch of `handle`, if any.
    pub(crate) fn take(&mut self, handle: PrimitiveHandle) -> Option<(DeliveryCallback, Vec<RawRecord>)> {
        let outlet = self.outlets.iter_mut().find(|o| o.handle == handle)?;
        if outlet.pending.is_empty() {
            return None;
        }
        Some((Arc::clone(&outlet.callback), std::mem::take(&mut outlet.pending)))
    }
}

fn push_accepted(outlet: &mut Outlet, records: &[RawRecord]) -> bool {
    let was_empty = outlet.pending.is_empty();
    for record in records {
        if outlet.accepts(record.kind) {
            outlet.pending.push(record.clone());
        }
    }
    was_empty && !outlet.pending.is_empty()
}

/// Delivers the buffered batch of `handle` outside the outbox lock.
pub(crate) fn deliver(outbox: &Mutex<Outbox>, handle: PrimitiveHandle) -> ObserveResult<()> {
    let next = outbox.lock().map_err(|_| lock_err("outbox"))?.take(handle);
    if let Some((callback, batch)) = next {
        callback(batch);
    }
    Ok(())
}

/// Schedules a delivery of `handle` for the end of the current turn.
pub(crate) fn schedule(scheduler: &dyn Scheduler, outbox: &Arc<Mutex<Outbox>>, handle: PrimitiveHandle) {
    let outbox = Arc::clone(outbox);
    scheduler.defer(Box::new(move || {
        if let Err(err) = deliver(&outbox, handle) {
            tracing::error!(%handle, error = %err, "Scheduled delivery failed");
        }
    }));
}

/// The built-in change primitive of the shim containers.
pub struct Notifier {
    scheduler: Arc<dyn Scheduler>,
    outbox: Arc<Mutex<Outbox>>,
    next_handle: AtomicU64,
}

impl Notifier {
    /// A notifier scheduling its deliveries on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            outbox: Arc::new(Mutex::new(Outbox::default())),
            next_handle: AtomicU64::new(1),
        }
    }

    fn outbox(&self) -> ObserveResult<MutexGuard<'_, Outbox>> {
        self.outbox.lock().map_err(|_| lock_err("outbox"))
    }

    /// Queues `records` for every subscriber.
    pub fn notify(&self, records: &[RawRecord]) {
        if records.is_empty() {
            return;
        }
        let fresh = match self.outbox() {
            Ok(mut outbox) => outbox.enqueue(records),
            Err(err) => {
                tracing::error!(error = %err, records = records.len(), "Dropping records");
                return;
            }
        };
        for handle in fresh {
            schedule(self.scheduler.as_ref(), &self.outbox, handle);
        }
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.outbox().map_or(0, |o| o.len())
    }
}

impl ChangePrimitive for Notifier {
    fn begin_observing(
        &self,
        _subject: &Subject,
        callback: DeliveryCallback,
        kind_filter: Option<&[RawKind]>,
    ) -> ObserveResult<PrimitiveHandle> {
        let handle = PrimitiveHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.outbox()?.add(handle, callback, kind_filter);
        Ok(handle)
    }

    fn end_observing(&self, _subject: &Subject, handle: PrimitiveHandle) {
        if let Ok(mut outbox) = self.outbox() {
            outbox.remove(handle);
        }
    }

    fn flush_pending(&self, handle: PrimitiveHandle) -> ObserveResult<()> {
        deliver(&self.outbox, handle)
    }
}
