//! Per-subscription event handlers.
//!
//! Provides callback-based hooks for a single change-feed subscription:
//!
//! - [`on_change`](SubscriptionHandlers::on_change): every change event (catch-all)
//! - [`on_insert`](SubscriptionHandlers::on_insert) / [`on_update`](SubscriptionHandlers::on_update) /
//!   [`on_delete`](SubscriptionHandlers::on_delete): typed slots that take precedence
//!   over `on_change` for their operation
//! - [`on_status`](SubscriptionHandlers::on_status): lifecycle transitions
//! - [`on_error`](SubscriptionHandlers::on_error): transport failures and panicking handlers
//!
//! Handlers run on whatever thread the transport delivers on. A panic inside
//! a handler is caught at the dispatch boundary and reported through
//! `on_error` as [`LinkError::HandlerError`]; it never unwinds into the
//! transport or the manager.
//!
//! # Example
//!
//! ```rust
//! use civic_link::SubscriptionHandlers;
//!
//! let handlers = SubscriptionHandlers::new()
//!     .on_insert(|event| println!("new issue: {:?}", event.new_row))
//!     .on_delete(|event| println!("removed: {:?}", event.old_row))
//!     .on_status(|status| println!("status: {}", status))
//!     .on_error(|err| eprintln!("subscription error: {}", err));
//! assert!(handlers.has_any());
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{LinkError, Result};
use crate::models::{ChangeEvent, ChangeOperation, SubscriptionStatus};

/// Type alias for change callbacks.
pub type OnChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Type alias for the on_status callback.
pub type OnStatusCallback = Arc<dyn Fn(SubscriptionStatus) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(LinkError) + Send + Sync>;

/// Handlers registered for one subscription.
///
/// All handlers are optional.
#[derive(Clone, Default)]
pub struct SubscriptionHandlers {
    pub(crate) on_change: Option<OnChangeCallback>,
    pub(crate) on_insert: Option<OnChangeCallback>,
    pub(crate) on_update: Option<OnChangeCallback>,
    pub(crate) on_delete: Option<OnChangeCallback>,
    pub(crate) on_status: Option<OnStatusCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
}

impl fmt::Debug for SubscriptionHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandlers")
            .field("on_change", &self.on_change.is_some())
            .field("on_insert", &self.on_insert.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_status", &self.on_status.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl SubscriptionHandlers {
    /// Create a new empty `SubscriptionHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the catch-all change callback.
    pub fn on_change(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_change = Some(Arc::new(f));
        self
    }

    /// Register a callback for `INSERT` events only.
    pub fn on_insert(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(f));
        self
    }

    /// Register a callback for `UPDATE` events only.
    pub fn on_update(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Register a callback for `DELETE` events only.
    pub fn on_delete(mut self, f: impl Fn(ChangeEvent) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked on every lifecycle transition.
    pub fn on_status(mut self, f: impl Fn(SubscriptionStatus) + Send + Sync + 'static) -> Self {
        self.on_status = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for transport failures and handler panics.
    ///
    /// Use [`LinkError::is_retryable`] to decide whether to offer a retry.
    pub fn on_error(mut self, f: impl Fn(LinkError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Handlers that forward everything into a bounded Tokio channel.
    ///
    /// Lets async consumers pull events with `recv().await` instead of
    /// registering closures. When the channel is full the event is dropped
    /// and a warning is logged; delivery never blocks the transport.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SubscriptionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let change_tx = tx.clone();
        let status_tx = tx.clone();
        let handlers = Self::new()
            .on_change(move |event| forward(&change_tx, SubscriptionEvent::Change(event)))
            .on_status(move |status| forward(&status_tx, SubscriptionEvent::Status(status)))
            .on_error(move |err| forward(&tx, SubscriptionEvent::Error(err)));
        (handlers, rx)
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_change.is_some()
            || self.on_insert.is_some()
            || self.on_update.is_some()
            || self.on_delete.is_some()
            || self.on_status.is_some()
            || self.on_error.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    /// Dispatch a change to its typed slot, falling back to `on_change`.
    pub(crate) fn emit_change(&self, event: ChangeEvent) -> Result<()> {
        let typed = match event.operation {
            ChangeOperation::Insert => &self.on_insert,
            ChangeOperation::Update => &self.on_update,
            ChangeOperation::Delete => &self.on_delete,
        };
        match typed.as_ref().or(self.on_change.as_ref()) {
            Some(cb) => guarded("change", || cb(event)),
            None => Ok(()),
        }
    }

    /// Dispatch the on_status event.
    pub(crate) fn emit_status(&self, status: SubscriptionStatus) -> Result<()> {
        match &self.on_status {
            Some(cb) => guarded("status", || cb(status)),
            None => Ok(()),
        }
    }

    /// Dispatch the on_error event. A panicking error handler is only logged.
    pub(crate) fn emit_error(&self, error: LinkError) {
        if let Some(cb) = &self.on_error {
            if let Err(e) = guarded("error", || cb(error)) {
                log::error!("[civic-link] {}", e);
            }
        }
    }
}

/// Item yielded by the receiver from [`SubscriptionHandlers::channel`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    Change(ChangeEvent),
    Status(SubscriptionStatus),
    Error(LinkError),
}

fn forward(tx: &mpsc::Sender<SubscriptionEvent>, event: SubscriptionEvent) {
    match tx.try_send(event) {
        Ok(()) => {},
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            log::warn!("[civic-link] Event channel full, dropping {:?}", dropped);
        },
        Err(mpsc::error::TrySendError::Closed(_)) => {
            log::debug!("[civic-link] Event receiver dropped");
        },
    }
}

fn guarded(kind: &str, f: impl FnOnce()) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        LinkError::HandlerError(format!("{} handler panicked: {}", kind, panic_message(&*payload)))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
