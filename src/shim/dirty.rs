//! Dirty-checking change primitive.
//!
//! For containers without a native primitive. Each subscription keeps a
//! snapshot of its container; [`DirtyChecker::check`] diffs every snapshot
//! against the live container and queues the resulting raw records for
//! delivery at the end of the turn. Unlike the native notifier this one can
//! always flush synchronously, since a flush is just a check followed by an
//! immediate delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};

use crate::adapter::{ChangePrimitive, DeliveryCallback, PrimitiveHandle, Scheduler};
use crate::container::{Key, Structure, Subject};
use crate::error::{lock_err, ObserveResult};
use crate::record::{RawKind, RawRecord};

use super::notifier::{deliver, schedule, Outbox};

enum Snapshot {
    Record(Map<String, Value>),
    List(Vec<Value>),
}

impl Snapshot {
    fn take(subject: &Subject) -> Self {
        match subject.structure() {
            Structure::Record => Self::Record(
                subject
                    .keys()
                    .into_iter()
                    .filter_map(|key| subject.get(&key).map(|value| (key.to_string(), value)))
                    .collect(),
            ),
            Structure::List => Self::List(
                subject
                    .keys()
                    .iter()
                    .map(|key| subject.get(key).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

struct Watch {
    subject: Subject,
    snapshot: Snapshot,
}

impl Watch {
    /// Diffs the snapshot against the live container and refreshes it.
    fn diff(&mut self) -> Vec<RawRecord> {
        let current = Snapshot::take(&self.subject);
        let records = match (&self.snapshot, &current) {
            (Snapshot::Record(old), Snapshot::Record(new)) => diff_record(&self.subject, old, new),
            (Snapshot::List(old), Snapshot::List(new)) => diff_list(&self.subject, old, new),
            _ => Vec::new(),
        };
        self.snapshot = current;
        records
    }
}

fn diff_record(subject: &Subject, old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<RawRecord> {
    let mut records = Vec::new();
    for (key, value) in new {
        match old.get(key) {
            None => records.push(RawRecord::add(subject.clone(), key.as_str())),
            Some(previous) if previous != value => {
                records.push(RawRecord::update(subject.clone(), key.as_str(), previous.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, previous) in old {
        if !new.contains_key(key) {
            records.push(RawRecord::delete(subject.clone(), key.as_str(), previous.clone()));
        }
    }
    records
}

/// Trims the common prefix and suffix; an equal-length middle becomes
/// per-index updates, anything else one splice.
fn diff_list(subject: &Subject, old: &[Value], new: &[Value]) -> Vec<RawRecord> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    if old_mid.is_empty() && new_mid.is_empty() {
        return Vec::new();
    }

    if old_mid.len() == new_mid.len() {
        return old_mid
            .iter()
            .zip(new_mid)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(offset, (previous, _))| RawRecord::update(subject.clone(), Key::Index(prefix + offset), previous.clone()))
            .collect();
    }
    vec![RawRecord::splice(subject.clone(), prefix, old_mid.to_vec(), new_mid.len())]
}

/// Change primitive that discovers mutations by comparing snapshots.
pub struct DirtyChecker {
    scheduler: Arc<dyn Scheduler>,
    outbox: Arc<Mutex<Outbox>>,
    watches: Mutex<HashMap<PrimitiveHandle, Watch>>,
    next_handle: AtomicU64,
}

impl DirtyChecker {
    /// A checker scheduling its deliveries on `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            outbox: Arc::new(Mutex::new(Outbox::default())),
            watches: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    fn watches(&self) -> ObserveResult<MutexGuard<'_, HashMap<PrimitiveHandle, Watch>>> {
        self.watches.lock().map_err(|_| lock_err("dirty-check watches"))
    }

    fn queue(&self, handle: PrimitiveHandle, records: &[RawRecord]) -> ObserveResult<bool> {
        Ok(self
            .outbox
            .lock()
            .map_err(|_| lock_err("outbox"))?
            .enqueue_for(handle, records))
    }

    /// Diffs every watched container and schedules deliveries for the
    /// changes found. Returns the number of raw records produced.
    ///
    /// # Errors
    /// Only on an internal lock failure.
    pub fn check(&self) -> ObserveResult<usize> {
        let found: Vec<(PrimitiveHandle, Vec<RawRecord>)> = self
            .watches()?
            .iter_mut()
            .map(|(handle, watch)| (*handle, watch.diff()))
            .filter(|(_, records)| !records.is_empty())
            .collect();

        let mut total = 0;
        for (handle, records) in found {
            total += records.len();
            if self.queue(handle, &records)? {
                schedule(self.scheduler.as_ref(), &self.outbox, handle);
            }
        }
        if total > 0 {
            tracing::trace!(records = total, "Dirty check found changes");
        }
        Ok(total)
    }

    /// Number of watched containers.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches().map_or(0, |w| w.len())
    }
}

impl ChangePrimitive for DirtyChecker {
    fn begin_observing(
        &self,
        subject: &Subject,
        callback: DeliveryCallback,
        kind_filter: Option<&[RawKind]>,
    ) -> ObserveResult<PrimitiveHandle> {
        let handle = PrimitiveHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.outbox
            .lock()
            .map_err(|_| lock_err("outbox"))?
            .add(handle, callback, kind_filter);
        self.watches()?.insert(
            handle,
            Watch {
                subject: subject.clone(),
                snapshot: Snapshot::take(subject),
            },
        );
        Ok(handle)
    }

    fn end_observing(&self, _subject: &Subject, handle: PrimitiveHandle) {
        if let Ok(mut watches) = self.watches() {
            watches.remove(&handle);
        }
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.remove(handle);
        }
    }

    fn flush_pending(&self, handle: PrimitiveHandle) -> ObserveResult<()> {
        let records = self.watches()?.get_mut(&handle).map(Watch::diff).unwrap_or_default();
        if !records.is_empty() {
            self.queue(handle, &records)?;
        }
        deliver(&self.outbox, handle)
    }
}
