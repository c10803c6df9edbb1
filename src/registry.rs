//! Registry of observation contexts, keyed by container identity.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::container::{ContainerId, Subject};
use crate::dispatch::DispatchEmitter;
use crate::error::{lock_err, ObserveResult};

/// Tracks the active contexts of every observed container.
///
/// Holds more than one context per container only when they were created
/// with `multiple_observers`.
#[derive(Debug, Default)]
pub struct Registry {
    contexts: Mutex<HashMap<ContainerId, Vec<DispatchEmitter>>>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ObserveResult<MutexGuard<'_, HashMap<ContainerId, Vec<DispatchEmitter>>>> {
        self.contexts.lock().map_err(|_| lock_err("registry"))
    }

    /// Active contexts for `subject`, in creation order.
    pub fn contexts(&self, subject: &Subject) -> ObserveResult<Vec<DispatchEmitter>> {
        Ok(self.lock()?.get(&subject.id()).cloned().unwrap_or_default())
    }

    /// Total number of active contexts.
    pub fn len(&self) -> ObserveResult<usize> {
        Ok(self.lock()?.values().map(Vec::len).sum())
    }

    /// Whether no context is active.
    pub fn is_empty(&self) -> ObserveResult<bool> {
        Ok(self.len()? == 0)
    }

    pub(crate) fn first(&self, subject: &Subject) -> ObserveResult<Option<DispatchEmitter>> {
        Ok(self.lock()?.get(&subject.id()).and_then(|list| list.first().cloned()))
    }

    pub(crate) fn insert(&self, emitter: DispatchEmitter) -> ObserveResult<()> {
        self.lock()?.entry(emitter.subject().id()).or_default().push(emitter);
        Ok(())
    }

    pub(crate) fn remove(&self, emitter: &DispatchEmitter) -> ObserveResult<()> {
        let mut contexts = self.lock()?;
        let id = emitter.subject().id();
        if let Some(list) = contexts.get_mut(&id) {
            list.retain(|e| e != emitter);
            if list.is_empty() {
                contexts.remove(&id);
            }
        }
        Ok(())
    }
}
