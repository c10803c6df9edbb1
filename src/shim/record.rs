//! Observable key-value record.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde_json::{Map, Value};

use crate::adapter::{ChangePrimitive, Scheduler};
use crate::container::{Key, Observable, Structure, Subject};
use crate::error::{lock_err, ObserveError, ObserveResult};
use crate::record::RawRecord;

use super::notifier::Notifier;

#[derive(Default)]
struct RecordState {
    values: Map<String, Value>,
    prototype: Option<Value>,
}

/// A record whose mutations are reported through its own [`Notifier`].
///
/// Keys keep insertion order. Writing a value equal to the current one
/// reports nothing.
pub struct ObservableRecord {
    this: Weak<Self>,
    state: RwLock<RecordState>,
    notifier: Arc<Notifier>,
}

impl ObservableRecord {
    /// An empty record.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Self::with_values(scheduler, Map::new())
    }

    /// A record holding `values`.
    #[must_use]
    pub fn with_values(scheduler: Arc<dyn Scheduler>, values: Map<String, Value>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            state: RwLock::new(RecordState {
                values,
                prototype: None,
            }),
            notifier: Arc::new(Notifier::new(scheduler)),
        })
    }

    fn read(&self) -> ObserveResult<RwLockReadGuard<'_, RecordState>> {
        self.state.read().map_err(|_| lock_err("record values"))
    }

    fn write(&self) -> ObserveResult<RwLockWriteGuard<'_, RecordState>> {
        self.state.write().map_err(|_| lock_err("record values"))
    }

    /// This record as an observation subject.
    ///
    /// # Errors
    /// Only while the record is being dropped.
    pub fn subject(&self) -> ObserveResult<Subject> {
        let this = self.this.upgrade().ok_or_else(|| ObserveError::internal("record dropped"))?;
        Ok(Subject::from(this))
    }

    /// Writes `value` at `key`, reporting an `add` or an `update`.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> ObserveResult<()> {
        let value = value.into();
        let previous = self.write()?.values.insert(key.to_string(), value.clone());
        let record = match previous {
            None => RawRecord::add(self.subject()?, key),
            Some(old) if old == value => return Ok(()),
            Some(old) => RawRecord::update(self.subject()?, key, old),
        };
        self.notifier.notify(&[record]);
        Ok(())
    }

    /// Removes `key`, reporting a `delete`. Returns the removed value.
    pub fn remove(&self, key: &str) -> ObserveResult<Option<Value>> {
        let removed = self.write()?.values.shift_remove(key);
        if let Some(old) = &removed {
            self.notifier
                .notify(&[RawRecord::delete(self.subject()?, key, old.clone())]);
        }
        Ok(removed)
    }

    /// Reports a `reconfigure` of `key` without changing its value.
    ///
    /// Returns `false` when the key does not exist.
    pub fn reconfigure(&self, key: &str) -> ObserveResult<bool> {
        let current = self.read()?.values.get(key).cloned();
        let Some(current) = current else {
            return Ok(false);
        };
        self.notifier
            .notify(&[RawRecord::reconfigure(self.subject()?, key, Some(current))]);
        Ok(true)
    }

    /// Replaces the prototype, reporting a `setPrototype`.
    pub fn set_prototype(&self, prototype: impl Into<Value>) -> ObserveResult<()> {
        let old = self.write()?.prototype.replace(prototype.into());
        self.notifier
            .notify(&[RawRecord::set_prototype(self.subject()?, old)]);
        Ok(())
    }

    /// Current prototype, if one was set.
    #[must_use]
    pub fn prototype(&self) -> Option<Value> {
        self.read().ok().and_then(|s| s.prototype.clone())
    }

    /// Snapshot of the current values.
    pub fn to_map(&self) -> ObserveResult<Map<String, Value>> {
        Ok(self.read()?.values.clone())
    }

    /// The record's change primitive.
    #[must_use]
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }
}

impl Observable for ObservableRecord {
    fn structure(&self) -> Structure {
        Structure::Record
    }

    fn get(&self, key: &Key) -> Option<Value> {
        let state = self.read().ok()?;
        match key {
            Key::Name(name) if name == "__proto__" => state.prototype.clone(),
            Key::Name(name) => state.values.get(name).cloned(),
            Key::Index(i) => state.values.get(&i.to_string()).cloned(),
        }
    }

    fn keys(&self) -> Vec<Key> {
        self.read()
            .map(|state| state.values.keys().cloned().map(Key::Name).collect())
            .unwrap_or_default()
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
    use crate::record::RawKind;
    use crate::shim::Host;

    fn observe(record: &Arc<ObservableRecord>) -> Arc<Mutex<Vec<RawRecord>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        let callback: DeliveryCallback = Arc::new(move |batch: Vec<RawRecord>| inner.lock().unwrap().extend(batch));
        let subject = record.subject().unwrap();
        record
            .notifier()
            .begin_observing(&subject, callback, None)
            .unwrap();
        seen
    }

    #[test]
    fn mutations_report_lazy_records() {
        let host = Arc::new(Host::new());
        let record = ObservableRecord::new(host.clone());
        let seen = observe(&record);

        record.set("a", 1).unwrap();
        record.set("a", 2).unwrap();
        record.set("a", 2).unwrap();
        record.remove("a").unwrap();
        record.remove("missing").unwrap();
        host.run_turn();

        let seen = seen.lock().unwrap();
        let kinds: Vec<RawKind> = seen.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RawKind::Add, RawKind::Update, RawKind::Delete]);
        assert_eq!(seen[0].old_value, None);
        assert_eq!(seen[1].old_value, Some(json!(1)));
        assert_eq!(seen[2].old_value, Some(json!(2)));
    }

    #[test]
    fn prototype_is_readable_through_proto_key() {
        let host = Arc::new(Host::new());
        let record = ObservableRecord::new(host.clone());
        let seen = observe(&record);

        record.set_prototype(json!({"kind": "base"})).unwrap();
        host.run_turn();

        let subject = record.subject().unwrap();
        assert_eq!(subject.get(&Key::from("__proto__")), Some(json!({"kind": "base"})));
        assert_eq!(seen.lock().unwrap()[0].kind, RawKind::SetPrototype);
        assert_eq!(seen.lock().unwrap()[0].old_value, None);
    }

    #[test]
    fn keys_keep_insertion_order() {
        let host = Arc::new(Host::new());
        let record = ObservableRecord::new(host);
        record.set("z", 1).unwrap();
        record.set("a", 2).unwrap();
        assert_eq!(record.keys(), vec![Key::from("z"), Key::from("a")]);
        assert!(!record.reconfigure("missing").unwrap());
    }
}
