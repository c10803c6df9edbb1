//! In-process host environment.
//!
//! A turn-based [`Host`] scheduler, containers that report their own
//! mutations ([`ObservableRecord`], [`ObservableList`]) and a
//! [`DirtyChecker`] primitive for containers that cannot.

mod dirty;
mod host;
mod list;
mod notifier;
mod record;

pub use dirty::DirtyChecker;
pub use host::Host;
pub use list::ObservableList;
pub use notifier::Notifier;
pub use record::ObservableRecord;
