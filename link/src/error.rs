//! Error types for civic-link.
//!
//! Construction-time problems are returned synchronously. Everything that
//! happens after a subscription is open (transport failures, panicking
//! handlers) is delivered through the subscription's `on_error` handler
//! instead of being returned to a caller.

use thiserror::Error;

/// Errors produced by civic-link.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Invalid constructor or subscription arguments. Never retryable.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The remote channel failed to connect, timed out or dropped.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A consumer-supplied handler panicked while an event was dispatched.
    #[error("Handler error: {0}")]
    HandlerError(String),

    /// `open` was called after the manager was torn down with `close_all`.
    #[error("Subscription manager has been shut down")]
    ManagerClosed,

    /// Internal invariant failure (e.g. a poisoned lock).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LinkError {
    /// Returns `true` if the consumer may reasonably retry the operation.
    ///
    /// Only transport failures qualify; this crate never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }

    /// Returns `true` for construction-time misconfiguration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }
}

/// Result type for civic-link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
