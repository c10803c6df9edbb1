//! Observation options.
//!
//! `Options` is the fully resolved configuration of a context. Callers pass
//! `ObserveOptions`, a set of optional overrides merged field by field into
//! the observer's defaults; only `output` is merged deeply.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::adapter::ChangePrimitive;
use crate::container::Structure;
use crate::record::RawKind;

/// Shape of the event stream produced for each delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputOptions {
    /// Dispatch only the synthetic batch event.
    pub batch_only: bool,
    /// Skip value resolution; `value` stays unset.
    pub drop_values: bool,
    /// Collapse the events about one value into their net effect.
    pub minimal_events: bool,
    /// Expand every update into a remove followed by an add.
    pub no_update_events: bool,
}

/// Partial overrides of [`OutputOptions`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OutputOverrides {
    /// Overrides [`OutputOptions::batch_only`].
    pub batch_only: Option<bool>,
    /// Overrides [`OutputOptions::drop_values`].
    pub drop_values: Option<bool>,
    /// Overrides [`OutputOptions::minimal_events`].
    pub minimal_events: Option<bool>,
    /// Overrides [`OutputOptions::no_update_events`].
    pub no_update_events: Option<bool>,
}

impl OutputOverrides {
    /// Whether nothing is overridden.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.batch_only.is_none()
            && self.drop_values.is_none()
            && self.minimal_events.is_none()
            && self.no_update_events.is_none()
    }
}

impl OutputOptions {
    /// Applies `overrides` on top of `self`.
    #[must_use]
    pub fn merged(&self, overrides: &OutputOverrides) -> Self {
        Self {
            batch_only: overrides.batch_only.unwrap_or(self.batch_only),
            drop_values: overrides.drop_values.unwrap_or(self.drop_values),
            minimal_events: overrides.minimal_events.unwrap_or(self.minimal_events),
            no_update_events: overrides.no_update_events.unwrap_or(self.no_update_events),
        }
    }
}

/// Caller-supplied change-detection primitives, used only when a container
/// has no native one.
#[derive(Clone, Default)]
pub struct Shim {
    /// Primitive for record containers.
    pub record: Option<Arc<dyn ChangePrimitive>>,
    /// Primitive for list containers.
    pub list: Option<Arc<dyn ChangePrimitive>>,
}

impl Shim {
    /// The primitive configured for `structure`.
    #[must_use]
    pub fn for_structure(&self, structure: Structure) -> Option<Arc<dyn ChangePrimitive>> {
        match structure {
            Structure::Record => self.record.clone(),
            Structure::List => self.list.clone(),
        }
    }

    /// Whether no primitive is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.record.is_none() && self.list.is_none()
    }

    fn merged(&self, other: &Self) -> Self {
        Self {
            record: other.record.clone().or_else(|| self.record.clone()),
            list: other.list.clone().or_else(|| self.list.clone()),
        }
    }
}

impl fmt::Debug for Shim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shim")
            .field("record", &self.record.is_some())
            .field("list", &self.list.is_some())
            .finish()
    }
}

/// Resolved options of an observation context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Raw kinds requested on top of add/update/delete. Record containers only.
    pub additional_event_types: Vec<RawKind>,
    /// Create a new context even when the container is already observed.
    pub multiple_observers: bool,
    /// Shape of the event stream.
    pub output: OutputOptions,
    /// Fallback primitives.
    #[serde(skip)]
    pub shim: Shim,
}

/// Overrides passed to `observe()` and `set_default_options()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObserveOptions {
    /// Overrides [`Options::additional_event_types`].
    pub additional_event_types: Option<Vec<RawKind>>,
    /// Overrides [`Options::multiple_observers`].
    pub multiple_observers: Option<bool>,
    /// Overrides merged into [`Options::output`].
    pub output: OutputOverrides,
    /// Fallback primitives; set entries replace the defaults.
    #[serde(skip)]
    pub shim: Shim,
}

impl ObserveOptions {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests extra raw kinds for record containers.
    #[must_use]
    pub fn additional_event_types(mut self, kinds: impl IntoIterator<Item = RawKind>) -> Self {
        self.additional_event_types = Some(kinds.into_iter().collect());
        self
    }

    /// Sets `multiple_observers`.
    #[must_use]
    pub const fn multiple_observers(mut self, enabled: bool) -> Self {
        self.multiple_observers = Some(enabled);
        self
    }

    /// Sets `output.batch_only`.
    #[must_use]
    pub const fn batch_only(mut self, enabled: bool) -> Self {
        self.output.batch_only = Some(enabled);
        self
    }

    /// Sets `output.drop_values`.
    #[must_use]
    pub const fn drop_values(mut self, enabled: bool) -> Self {
        self.output.drop_values = Some(enabled);
        self
    }

    /// Sets `output.minimal_events`.
    #[must_use]
    pub const fn minimal_events(mut self, enabled: bool) -> Self {
        self.output.minimal_events = Some(enabled);
        self
    }

    /// Sets `output.no_update_events`.
    #[must_use]
    pub const fn no_update_events(mut self, enabled: bool) -> Self {
        self.output.no_update_events = Some(enabled);
        self
    }

    /// Uses `primitive` for records without a native one.
    #[must_use]
    pub fn record_shim(mut self, primitive: Arc<dyn ChangePrimitive>) -> Self {
        self.shim.record = Some(primitive);
        self
    }

    /// Uses `primitive` for lists without a native one.
    #[must_use]
    pub fn list_shim(mut self, primitive: Arc<dyn ChangePrimitive>) -> Self {
        self.shim.list = Some(primitive);
        self
    }
}

impl Options {
    /// Applies `overrides` on top of `self`.
    #[must_use]
    pub fn merged(&self, overrides: &ObserveOptions) -> Self {
        Self {
            additional_event_types: overrides
                .additional_event_types
                .clone()
                .unwrap_or_else(|| self.additional_event_types.clone()),
            multiple_observers: overrides.multiple_observers.unwrap_or(self.multiple_observers),
            output: self.output.merged(&overrides.output),
            shim: self.shim.merged(&overrides.shim),
        }
    }

    /// Raw kinds to request from the primitive, `None` meaning "everything".
    ///
    /// List containers always receive the full splice vocabulary.
    #[must_use]
    pub fn kind_filter(&self, structure: Structure) -> Option<Vec<RawKind>> {
        match structure {
            Structure::List => None,
            Structure::Record => {
                let mut kinds = RawKind::RECORD_STANDARD.to_vec();
                for kind in &self.additional_event_types {
                    if !kinds.contains(kind) {
                        kinds.push(*kind);
                    }
                }
                Some(kinds)
            }
        }
    }
}
