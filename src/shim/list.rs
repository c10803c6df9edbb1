//! Observable ordered list.
//!
//! Structural operations report `splice` records; writing inside the
//! current bounds reports an `update`, writing past the end reports a
//! splice that grows the list (padding with `null`).

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde_json::Value;

use crate::adapter::{ChangePrimitive, Scheduler};
use crate::container::{Key, Observable, Structure, Subject};
use crate::error::{lock_err, ObserveError, ObserveResult};
use crate::record::RawRecord;

use super::notifier::Notifier;

/// A list whose mutations are reported through its own [`Notifier`].
pub struct ObservableList {
    this: Weak<Self>,
    items: RwLock<Vec<Value>>,
    notifier: Arc<Notifier>,
}

impl ObservableList {
    /// An empty list.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Self::with_items(scheduler, Vec::new())
    }

    /// A list holding `items`.
    #[must_use]
    pub fn with_items(scheduler: Arc<dyn Scheduler>, items: Vec<Value>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            items: RwLock::new(items),
            notifier: Arc::new(Notifier::new(scheduler)),
        })
    }

    fn read(&self) -> ObserveResult<RwLockReadGuard<'_, Vec<Value>>> {
        self.items.read().map_err(|_| lock_err("list items"))
    }

    fn write(&self) -> ObserveResult<RwLockWriteGuard<'_, Vec<Value>>> {
        self.items.write().map_err(|_| lock_err("list items"))
    }

    /// This list as an observation subject.
    ///
    /// # Errors
    /// Only while the list is being dropped.
    pub fn subject(&self) -> ObserveResult<Subject> {
        let this = self.this.upgrade().ok_or_else(|| ObserveError::internal("list dropped"))?;
        Ok(Subject::from(this))
    }

    fn report(&self, record: impl FnOnce(Subject) -> RawRecord) -> ObserveResult<()> {
        self.notifier.notify(&[record(self.subject()?)]);
        Ok(())
    }

    /// Writes `value` at `index`.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> ObserveResult<()> {
        let value = value.into();
        let mut items = self.write()?;
        let len = items.len();
        if index < len {
            let old = std::mem::replace(&mut items[index], value.clone());
            drop(items);
            if old != value {
                self.report(|subject| RawRecord::update(subject, index, old))?;
            }
            return Ok(());
        }

        items.resize(index, Value::Null);
        items.push(value);
        drop(items);
        self.report(|subject| RawRecord::splice(subject, len, Vec::new(), index + 1 - len))
    }

    /// Clears the slot at `index` without shifting, reporting a `delete`.
    ///
    /// The slot keeps its position and reads as `null` afterwards.
    pub fn delete(&self, index: usize) -> ObserveResult<Option<Value>> {
        let mut items = self.write()?;
        let Some(slot) = items.get_mut(index) else {
            return Ok(None);
        };
        let old = std::mem::replace(slot, Value::Null);
        drop(items);
        self.report(|subject| RawRecord::delete(subject, index, old.clone()))?;
        Ok(Some(old))
    }

    /// Appends `values`. Returns the new length.
    pub fn push<I>(&self, values: I) -> ObserveResult<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let len = self.len();
        self.splice(len, 0, values)?;
        Ok(self.len())
    }

    /// Removes the last value.
    pub fn pop(&self) -> ObserveResult<Option<Value>> {
        let len = self.len();
        if len == 0 {
            return Ok(None);
        }
        Ok(self.splice(len - 1, 1, Vec::<Value>::new())?.pop())
    }

    /// Removes the first value.
    pub fn shift(&self) -> ObserveResult<Option<Value>> {
        Ok(self.splice(0, 1, Vec::<Value>::new())?.into_iter().next())
    }

    /// Prepends `values`. Returns the new length.
    pub fn unshift<I>(&self, values: I) -> ObserveResult<usize>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.splice(0, 0, values)?;
        Ok(self.len())
    }

    /// Removes `delete_count` values at `index` and inserts `values` there.
    ///
    /// `index` and `delete_count` are clamped to the list bounds. Returns
    /// the removed values. Reports nothing when nothing changes.
    pub fn splice<I>(&self, index: usize, delete_count: usize, values: I) -> ObserveResult<Vec<Value>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let added = values.len();

        let mut items = self.write()?;
        let index = index.min(items.len());
        let end = index.saturating_add(delete_count).min(items.len());
        let removed: Vec<Value> = items.splice(index..end, values).collect();
        drop(items);

        if !removed.is_empty() || added > 0 {
            let reported = removed.clone();
            self.report(|subject| RawRecord::splice(subject, index, reported, added))?;
        }
        Ok(removed)
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().map_or(0, |items| items.len())
    }

    /// Whether the list has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current values.
    pub fn to_vec(&self) -> ObserveResult<Vec<Value>> {
        Ok(self.read()?.clone())
    }

    /// The list's change primitive.
    #[must_use]
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }
}

impl Observable for ObservableList {
    fn structure(&self) -> Structure {
        Structure::List
    }

    fn get(&self, key: &Key) -> Option<Value> {
        let index = key.as_index()?;
        self.read().ok()?.get(index).cloned()
    }

    fn keys(&self) -> Vec<Key> {
        (0..self.len()).map(Key::Index).collect()
    }

    fn native_primitive(&self) -> Option<Arc<dyn ChangePrimitive>> {
        Some(Arc::clone(&self.notifier) as Arc<dyn ChangePrimitive>)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::adapter::DeliveryCallback;
    use crate::record::{RawKind, Splice};
    use crate::shim::Host;

    fn observe(list: &Arc<ObservableList>) -> Arc<Mutex<Vec<RawRecord>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        let callback: DeliveryCallback = Arc::new(move |batch: Vec<RawRecord>| inner.lock().unwrap().extend(batch));
        let subject = list.subject().unwrap();
        list.notifier().begin_observing(&subject, callback, None).unwrap();
        seen
    }

    #[test]
    fn writing_past_the_end_grows_with_nulls() {
        let host = Arc::new(Host::new());
        let list = ObservableList::with_items(host.clone(), vec![json!(1)]);
        let seen = observe(&list);

        list.set(3, "x").unwrap();
        host.run_turn();

        assert_eq!(list.to_vec().unwrap(), vec![json!(1), Value::Null, Value::Null, json!("x")]);
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].splice,
            Some(Splice {
                index: 1,
                removed: vec![],
                added_count: 3
            })
        );
    }

    #[test]
    fn structural_operations_report_splices() {
        let host = Arc::new(Host::new());
        let list = ObservableList::with_items(host.clone(), vec![json!("a"), json!("b")]);
        let seen = observe(&list);

        assert_eq!(list.push(["c"]).unwrap(), 3);
        assert_eq!(list.shift().unwrap(), Some(json!("a")));
        assert_eq!(list.pop().unwrap(), Some(json!("c")));
        assert_eq!(list.unshift(["z", "y"]).unwrap(), 3);
        assert!(list.splice(9, 1, Vec::<Value>::new()).unwrap().is_empty());
        host.run_turn();

        assert_eq!(list.to_vec().unwrap(), vec![json!("z"), json!("y"), json!("b")]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|r| r.kind == RawKind::Splice));
        assert_eq!(seen[1].splice.as_ref().unwrap().removed, vec![json!("a")]);
    }

    #[test]
    fn delete_leaves_a_null_slot() {
        let host = Arc::new(Host::new());
        let list = ObservableList::with_items(host.clone(), vec![json!(1), json!(2)]);
        let seen = observe(&list);

        assert_eq!(list.delete(0).unwrap(), Some(json!(1)));
        assert_eq!(list.delete(5).unwrap(), None);
        host.run_turn();

        assert_eq!(list.len(), 2);
        assert_eq!(list.get(&Key::Index(0)), Some(Value::Null));
        assert_eq!(seen.lock().unwrap()[0].kind, RawKind::Delete);
    }
}
