//! The per-context dispatch emitter.
//!
//! Lifecycle: `detached -> attached` via [`DispatchEmitter::enable`],
//! `attached -> detached` via [`DispatchEmitter::disable`], and either state
//! to `destroyed` via [`DispatchEmitter::destroy`]. Before detaching, the
//! primitive is flushed synchronously so no buffered record is lost.
//!
//! No lock is held while a handler or the primitive runs, so handlers may
//! call back into the emitter (`on`, `off`, `disable`, ...) during dispatch.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::adapter::{ChangePrimitive, DeliveryCallback, PrimitiveHandle, Scheduler};
use crate::container::{Key, Structure, Subject};
use crate::error::{lock_err, ObserveError, ObserveResult};
use crate::event::{ChangeEvent, Event, EventType};
use crate::normalize::{normalize, normalize_computed};
use crate::options::{ObserveOptions, Options};
use crate::record::{RawKind, RawRecord};
use crate::registry::Registry;

use super::filter::{parse_binding_tokens, parse_tokens, Registration};
use super::{ContextId, Handler};

struct Attachment {
    primitive: Arc<dyn ChangePrimitive>,
    handle: PrimitiveHandle,
    kinds: Option<Vec<RawKind>>,
}

#[derive(Default)]
struct ContextState {
    options: Options,
    handlers: Vec<Registration>,
    attached: Option<Attachment>,
    destroying: bool,
    destroyed: bool,
}

struct Context {
    id: ContextId,
    subject: Subject,
    structure: Structure,
    registry: Weak<Registry>,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<ContextState>,
}

impl Context {
    fn state(&self) -> ObserveResult<MutexGuard<'_, ContextState>> {
        self.state.lock().map_err(|_| lock_err("context state"))
    }

    /// Runs one raw batch through the pipeline and dispatches the result.
    fn deliver(&self, raw: Vec<RawRecord>) {
        if raw.is_empty() {
            return;
        }

        let output = match self.state() {
            Ok(state) => state.options.output,
            Err(err) => {
                tracing::error!(context = %self.id, error = %err, "Dropping batch");
                return;
            }
        };

        let raw_len = raw.len();
        let batch = normalize(&self.subject, raw, self.structure, &output);
        tracing::trace!(
            context = %self.id,
            raw = raw_len,
            computed = batch.computed.len(),
            "Delivering batch"
        );
        self.dispatch(batch.into_events(&output));
    }

    fn dispatch(&self, events: Vec<Event>) {
        for event in &events {
            // Re-read per event: a handler may have changed the bindings.
            let targets: Vec<Handler> = match self.state() {
                Ok(state) => state
                    .handlers
                    .iter()
                    .filter(|reg| reg.matches(event))
                    .map(|reg| Arc::clone(&reg.handler))
                    .collect(),
                Err(err) => {
                    tracing::error!(context = %self.id, error = %err, "Aborting dispatch");
                    return;
                }
            };

            for handler in targets {
                handler(event);
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let attachment = match self.state.get_mut() {
            Ok(state) => state.attached.take(),
            Err(poisoned) => poisoned.into_inner().attached.take(),
        };
        if let Some(att) = attachment {
            att.primitive.end_observing(&self.subject, att.handle);
        }
    }
}

/// Handle to one observation context. Clones share the context.
#[derive(Clone)]
pub struct DispatchEmitter {
    inner: Arc<Context>,
}

impl DispatchEmitter {
    pub(crate) fn new(
        subject: Subject,
        options: Options,
        registry: Weak<Registry>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let structure = subject.structure();
        Self {
            inner: Arc::new(Context {
                id: ContextId::new(),
                subject,
                structure,
                registry,
                scheduler,
                state: Mutex::new(ContextState {
                    options,
                    ..ContextState::default()
                }),
            }),
        }
    }

    /// Unique id of this context.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// The observed container.
    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.inner.subject
    }

    /// Structural kind fixed when the context was created.
    #[must_use]
    pub fn structure(&self) -> Structure {
        self.inner.structure
    }

    /// Snapshot of the current options.
    pub fn options(&self) -> ObserveResult<Options> {
        Ok(self.inner.state()?.options.clone())
    }

    /// Whether the context currently receives raw records.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.state().is_ok_and(|s| s.attached.is_some())
    }

    /// Whether `destroy()` has completed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.state().map_or(true, |s| s.destroyed)
    }

    /// Number of handler registrations.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.state().map_or(0, |s| s.handlers.len())
    }

    /// Binds `handler` to the event types in `types` and the keys in `names`.
    ///
    /// `types` is a space-separated list of `type` or `type.namespace`
    /// tokens; `None` binds to every type. Binding a handler that is already
    /// bound with the same name filter extends its type filter.
    ///
    /// # Errors
    /// `MissingHandler` without a handler, `InvalidEventType` for an unknown
    /// type token, `Destroyed` after `destroy()`.
    pub fn on(&self, types: Option<&str>, names: Option<&[Key]>, handler: Option<Handler>) -> ObserveResult<&Self> {
        let handler = handler.ok_or(ObserveError::MissingHandler)?;
        let types = parse_binding_tokens(types)?;
        let names: Option<Vec<Key>> = names.map(|keys| {
            keys.iter()
                .cloned()
                .map(|k| k.coerce(self.inner.structure))
                .collect()
        });

        let mut state = self.inner.state()?;
        if state.destroyed {
            return Err(ObserveError::Destroyed { context: self.inner.id });
        }

        let existing = state
            .handlers
            .iter()
            .position(|reg| reg.is_handler(&handler) && reg.names == names);
        match existing {
            Some(i) => state.handlers[i].merge_types(types),
            None => state.handlers.push(Registration::new(handler, names, types)),
        }
        Ok(self)
    }

    /// Unbinds handlers.
    ///
    /// Pending records are flushed first so events already in flight are
    /// dispatched under the old bindings. `types` may contain `type`,
    /// `type.namespace` or `.namespace` patterns; `None` removes the
    /// matching registrations entirely. `handler = None` targets every
    /// registration.
    ///
    /// # Errors
    /// `InvalidEventType` for an unknown type token.
    pub fn off(&self, types: Option<&str>, handler: Option<&Handler>) -> ObserveResult<&Self> {
        let patterns = parse_tokens(types)?;
        self.flush_quietly();

        let mut state = self.inner.state()?;
        state.handlers.retain_mut(|reg| {
            if handler.is_some_and(|h| !reg.is_handler(h)) {
                return true;
            }
            match &patterns {
                None => false,
                Some(patterns) => !reg.remove_types(patterns),
            }
        });
        Ok(self)
    }

    /// Dispatches a synthetic batch of `event_type` events for `keys`
    /// (default: every current key), bypassing the change primitive.
    ///
    /// # Errors
    /// `InvalidEventType` for `batch` or an unknown type, `Destroyed` after
    /// `destroy()`.
    pub fn trigger(&self, event_type: &str, keys: Option<&[Key]>) -> ObserveResult<&Self> {
        let parsed: EventType = event_type.parse()?;
        let kind = parsed.change_kind().ok_or_else(|| ObserveError::InvalidEventType {
            token: event_type.to_string(),
        })?;

        let output = {
            let state = self.inner.state()?;
            if state.destroyed {
                return Err(ObserveError::Destroyed { context: self.inner.id });
            }
            state.options.output
        };

        let subject = &self.inner.subject;
        let structure = self.inner.structure;
        let keys = keys.map_or_else(|| subject.keys(), <[Key]>::to_vec);
        let computed = keys
            .into_iter()
            .map(|key| {
                let key = key.coerce(structure);
                let value = if output.drop_values || !kind.carries_value() {
                    None
                } else {
                    subject.get(&key)
                };
                ChangeEvent::new(kind, key, subject.clone()).with_value(value)
            })
            .collect();

        let batch = normalize_computed(subject, computed, structure, &output);
        tracing::trace!(context = %self.inner.id, event_type, computed = batch.computed.len(), "Triggering batch");
        self.inner.dispatch(batch.into_events(&output));
        Ok(self)
    }

    /// Starts receiving raw records from the change primitive.
    ///
    /// The container's native primitive is preferred; the shim configured
    /// for its structural kind is used otherwise.
    ///
    /// # Errors
    /// `CapabilityUnavailable` when neither exists, `Destroyed` after
    /// `destroy()`, or the primitive's own registration error.
    pub fn enable(&self) -> ObserveResult<&Self> {
        let (primitive, kinds) = {
            let state = self.inner.state()?;
            if state.destroyed {
                return Err(ObserveError::Destroyed { context: self.inner.id });
            }
            if state.attached.is_some() {
                return Ok(self);
            }

            let structure = self.inner.structure;
            let primitive = self
                .inner
                .subject
                .native_primitive()
                .or_else(|| state.options.shim.for_structure(structure))
                .ok_or(ObserveError::CapabilityUnavailable { structure })?;
            (primitive, state.options.kind_filter(structure))
        };

        let weak = Arc::downgrade(&self.inner);
        let id = self.inner.id;
        let callback: DeliveryCallback = Arc::new(move |raw: Vec<RawRecord>| match weak.upgrade() {
            Some(context) => context.deliver(raw),
            None => tracing::warn!(context = %id, records = raw.len(), "Delivery for dropped context"),
        });

        let handle = primitive.begin_observing(&self.inner.subject, callback, kinds.as_deref())?;
        self.inner.state()?.attached = Some(Attachment { primitive, handle, kinds });
        tracing::debug!(context = %id, %handle, structure = %self.inner.structure, "Context enabled");
        Ok(self)
    }

    /// Stops receiving raw records, after flushing those already buffered.
    ///
    /// # Errors
    /// Only on an internal lock failure.
    pub fn disable(&self) -> ObserveResult<&Self> {
        self.flush_quietly();

        let attachment = self.inner.state()?.attached.take();
        if let Some(att) = attachment {
            att.primitive.end_observing(&self.inner.subject, att.handle);
            tracing::debug!(context = %self.inner.id, handle = %att.handle, "Context disabled");
        }
        Ok(self)
    }

    /// Synchronously delivers the records the primitive has buffered.
    ///
    /// Does nothing while disabled.
    ///
    /// # Errors
    /// `FlushUnavailable` when the primitive cannot flush.
    pub fn deliver_change_records(&self) -> ObserveResult<&Self> {
        let target = self
            .inner
            .state()?
            .attached
            .as_ref()
            .map(|att| (Arc::clone(&att.primitive), att.handle));

        if let Some((primitive, handle)) = target {
            primitive.flush_pending(handle)?;
        }
        Ok(self)
    }

    /// Tears the context down: flushes, unbinds every handler, detaches and
    /// leaves the registry.
    ///
    /// With `asynchronous`, the context leaves the registry at once but
    /// teardown runs after the current delivery turn, so deliveries already
    /// in flight still reach their handlers while a later `observe()` gets a
    /// fresh context.
    ///
    /// # Errors
    /// Only on an internal lock failure.
    pub fn destroy(&self, asynchronous: bool) -> ObserveResult<()> {
        if asynchronous {
            {
                let mut state = self.inner.state()?;
                if state.destroying || state.destroyed {
                    return Ok(());
                }
                state.destroying = true;
            }
            self.leave_registry()?;

            let emitter = self.clone();
            self.inner.scheduler.defer(Box::new(move || {
                if let Err(err) = emitter.teardown() {
                    tracing::error!(context = %emitter.id(), error = %err, "Deferred teardown failed");
                }
            }));
            tracing::debug!(context = %self.inner.id, "Context teardown deferred");
            return Ok(());
        }
        self.teardown()
    }

    fn teardown(&self) -> ObserveResult<()> {
        self.flush_quietly();
        self.inner.state()?.handlers.clear();
        self.disable()?;
        self.inner.state()?.destroyed = true;

        self.leave_registry()?;
        tracing::debug!(context = %self.inner.id, "Context destroyed");
        Ok(())
    }

    fn leave_registry(&self) -> ObserveResult<()> {
        match self.inner.registry.upgrade() {
            Some(registry) => registry.remove(self),
            None => Ok(()),
        }
    }

    /// Applies `overrides` from a repeated `observe()` call on the same container.
    pub(crate) fn retarget(&self, overrides: &ObserveOptions, handler: Option<Handler>) -> ObserveResult<()> {
        let reattach = {
            let mut state = self.inner.state()?;
            if state.destroying || state.destroyed {
                return Err(ObserveError::Destroyed { context: self.inner.id });
            }
            state.options = state.options.merged(overrides);
            let kinds = state.options.kind_filter(self.inner.structure);
            state.attached.as_ref().is_some_and(|att| att.kinds != kinds)
        };

        if reattach {
            self.disable()?;
            self.enable()?;
        }
        if let Some(handler) = handler {
            self.on(None, None, Some(handler))?;
        }
        Ok(())
    }

    fn flush_quietly(&self) {
        match self.deliver_change_records() {
            Ok(_) => {}
            Err(ObserveError::FlushUnavailable) => {
                tracing::debug!(context = %self.inner.id, "Primitive cannot flush; buffered records stay pending");
            }
            Err(err) => {
                tracing::warn!(context = %self.inner.id, error = %err, "Flush failed");
            }
        }
    }
}

impl PartialEq for DispatchEmitter {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for DispatchEmitter {}

impl fmt::Debug for DispatchEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEmitter")
            .field("id", &self.inner.id)
            .field("subject", &self.inner.subject)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
