//! # observe-evented
//!
//! Turns the lazy, low-level mutation records reported by a change-detection
//! primitive into a richer stream of change events, and dispatches them to
//! handlers filtered by event type, namespace and key.
//!
//! ## Core Concepts
//!
//! - **Subject**: the observed container, a key-value record or an ordered list
//! - **RawRecord**: one lazy mutation notification (old values only)
//! - **ChangeEvent**: one logical change with resolved old and new values
//! - **DispatchEmitter**: the handler registry and lifecycle of one observation context
//!
//! Every delivery produces a `batch` event first, carrying the raw records
//! and the computed events, followed by one event per computed change.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use observe_evented::{handler, Host, ObservableRecord, Observer};
//!
//! let host = Arc::new(Host::new());
//! let observer = Observer::new(host.clone());
//! let record = ObservableRecord::new(host.clone());
//!
//! let emitter = observer.observe(Arc::clone(&record), None, None)?;
//! emitter.on(Some("update.ui"), None, Some(handler(|event| {
//!     println!("{:?} -> {:?}", event.key(), event.as_change().and_then(|c| c.value.clone()));
//! })))?;
//!
//! record.set("fruit", "apple")?;
//! record.set("fruit", "pear")?;
//! host.run_turn();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Containers and raw records
pub mod adapter;
pub mod container;
pub mod error;
pub mod record;

// Normalization pipeline
pub mod event;
pub mod normalize;
pub mod options;

// Subscription layer
pub mod dispatch;
pub mod observer;
pub mod registry;

// In-process host
pub mod shim;

pub use adapter::{ChangePrimitive, DeliveryCallback, PrimitiveHandle, Scheduler, Task};
pub use container::{ContainerId, Key, Observable, Structure, Subject};
pub use dispatch::{handler, ContextId, DispatchEmitter, Handler, TypeEntry};
pub use error::{ObserveError, ObserveResult};
pub use event::{BatchEvent, ChangeEvent, ChangeKind, Event, EventType};
pub use normalize::{normalize, normalize_computed, EventBatch};
pub use observer::Observer;
pub use options::{ObserveOptions, Options, OutputOptions, OutputOverrides, Shim};
pub use record::{RawKind, RawRecord, Splice};
pub use registry::Registry;
pub use shim::{DirtyChecker, Host, ObservableList, ObservableRecord};

pub use serde_json::Value;
