//! Top-level entry point.
//!
//! An [`Observer`] owns the context registry, the process-wide default
//! options and the scheduler used for deferred teardown.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::adapter::Scheduler;
use crate::container::Subject;
use crate::dispatch::{DispatchEmitter, Handler};
use crate::error::{lock_err, ObserveResult};
use crate::options::{ObserveOptions, Options};
use crate::registry::Registry;

/// Factory of observation contexts.
pub struct Observer {
    registry: Arc<Registry>,
    scheduler: Arc<dyn Scheduler>,
    defaults: Mutex<Options>,
}

impl Observer {
    /// An observer with default options.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_defaults(scheduler, Options::default())
    }

    /// An observer starting from `defaults`.
    #[must_use]
    pub fn with_defaults(scheduler: Arc<dyn Scheduler>, defaults: Options) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            scheduler,
            defaults: Mutex::new(defaults),
        }
    }

    fn defaults(&self) -> ObserveResult<MutexGuard<'_, Options>> {
        self.defaults.lock().map_err(|_| lock_err("default options"))
    }

    /// Starts observing `subject` and returns its dispatch emitter.
    ///
    /// When the container already has a context and `multiple_observers` is
    /// not requested, that context is returned with `options` merged into
    /// its own and `handler` bound to every event. Otherwise a new, enabled
    /// context is created from the defaults merged with `options`.
    ///
    /// # Errors
    /// `CapabilityUnavailable` when the container has no native primitive
    /// and no shim is configured for its structural kind.
    pub fn observe(
        &self,
        subject: impl Into<Subject>,
        options: Option<ObserveOptions>,
        handler: Option<Handler>,
    ) -> ObserveResult<DispatchEmitter> {
        let subject = subject.into();
        let overrides = options.unwrap_or_default();
        let resolved = self.defaults()?.merged(&overrides);

        if !resolved.multiple_observers {
            if let Some(existing) = self.registry.first(&subject)? {
                existing.retarget(&overrides, handler)?;
                return Ok(existing);
            }
        }

        let emitter = DispatchEmitter::new(
            subject,
            resolved,
            Arc::downgrade(&self.registry),
            Arc::clone(&self.scheduler),
        );
        if let Some(handler) = handler {
            emitter.on(None, None, Some(handler))?;
        }
        emitter.enable()?;
        self.registry.insert(emitter.clone())?;

        tracing::debug!(context = %emitter.id(), subject = %emitter.subject().id(), "Observing container");
        Ok(emitter)
    }

    /// Merges `options` into the defaults used by later `observe()` calls.
    pub fn set_default_options(&self, options: &ObserveOptions) -> ObserveResult<()> {
        let mut defaults = self.defaults()?;
        *defaults = defaults.merged(options);
        Ok(())
    }

    /// Current default options.
    pub fn default_options(&self) -> ObserveResult<Options> {
        Ok(self.defaults()?.clone())
    }

    /// Destroys every context observing `subject`. Returns how many there were.
    pub fn unobserve(&self, subject: &Subject) -> ObserveResult<usize> {
        let contexts = self.registry.contexts(subject)?;
        for emitter in &contexts {
            emitter.destroy(false)?;
        }
        Ok(contexts.len())
    }

    /// Registry of the active contexts.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
