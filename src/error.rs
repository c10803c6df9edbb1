//! Error types for observe-evented.
//!
//! All errors are strongly typed using thiserror. Normalization itself never
//! fails; errors only surface from the public subscription surface when the
//! host configuration is unusable or a context is misused.

use thiserror::Error;

use crate::container::Structure;
use crate::dispatch::ContextId;

/// Errors raised by the observation surface.
#[derive(Debug, Error)]
pub enum ObserveError {
    /// Neither a native primitive nor a shim exists for the container.
    #[error("No change-detection capability for {structure} containers and no shim supplied")]
    CapabilityUnavailable {
        structure: Structure,
    },

    /// `on()` was called without a handler.
    #[error("A handler function is required")]
    MissingHandler,

    /// The primitive cannot flush synchronously.
    #[error("The change-detection primitive cannot flush pending records synchronously")]
    FlushUnavailable,

    /// An event-type token names no known type.
    #[error("Unknown event type '{token}'")]
    InvalidEventType {
        token: String,
    },

    /// The context was destroyed.
    #[error("Observation context {context} has been destroyed")]
    Destroyed {
        context: ContextId,
    },

    /// Poisoned lock or broken invariant.
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ObserveError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true for fatal configuration errors.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::CapabilityUnavailable { .. } | Self::MissingHandler | Self::FlushUnavailable
        )
    }

    /// Returns true when the caller used the API incorrectly.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Self::InvalidEventType { .. } | Self::Destroyed { .. })
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for observation operations.
pub type ObserveResult<T> = Result<T, ObserveError>;

pub(crate) fn lock_err(context: &'static str) -> ObserveError {
    ObserveError::internal(format!("poisoned lock: {context}"))
}
