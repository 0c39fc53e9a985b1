//! Per-subscription dispatch state.
//!
//! A [`Dispatcher`] sits between the transport callbacks and the consumer's
//! handlers. Its tagged status (`Pending`/`Connected`/`Error`/`Closed`) and
//! the manager-wide liveness flag are both checked before anything reaches a
//! handler, and every handler call runs inside a [`DeliveryGate`] that
//! `shutdown` closes and drains. Once `shutdown` returns nothing else is
//! delivered, even for events that were already in flight on another thread.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::debounce::{Debouncer, Push};
use super::gate::DeliveryGate;
use crate::clock::Clock;
use crate::error::LinkError;
use crate::event_handlers::SubscriptionHandlers;
use crate::models::{ChangeEvent, EventMask, SubscriptionInfo, SubscriptionStatus};
use crate::transport::ChannelStatus;

pub(crate) struct Dispatcher {
    channel_id: String,
    table: String,
    event_mask: EventMask,
    generation: u64,
    handlers: SubscriptionHandlers,
    status: AtomicU8,
    gate: DeliveryGate,
    manager_alive: Arc<AtomicBool>,
    debouncer: Option<Debouncer>,
    clock: Arc<dyn Clock>,
    created_at_ms: u64,
    /// 0 until the first delivery.
    last_event_time_ms: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        channel_id: String,
        table: String,
        event_mask: EventMask,
        generation: u64,
        handlers: SubscriptionHandlers,
        manager_alive: Arc<AtomicBool>,
        debouncer: Option<Debouncer>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let created_at_ms = clock.now_ms();
        Arc::new(Self {
            channel_id,
            table,
            event_mask,
            generation,
            handlers,
            status: AtomicU8::new(SubscriptionStatus::Pending.as_u8()),
            gate: DeliveryGate::default(),
            manager_alive,
            debouncer,
            clock,
            created_at_ms,
            last_event_time_ms: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub(crate) fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn is_live(&self) -> bool {
        self.manager_alive.load(Ordering::SeqCst) && self.status() != SubscriptionStatus::Closed
    }

    pub(crate) fn is_active(&self) -> bool {
        self.manager_alive.load(Ordering::SeqCst) && self.status().is_active()
    }

    fn mark_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Entry point for the transport's change-feed callback.
    pub(crate) fn receive(self: &Arc<Self>, event: ChangeEvent) {
        if !self.is_live() {
            self.mark_dropped();
            log::trace!(
                "[civic-link] Dropping {} on '{}' after teardown",
                event.operation,
                self.channel_id
            );
            return;
        }
        if event.table != self.table || !self.event_mask.contains(event.operation) {
            self.mark_dropped();
            log::debug!(
                "[civic-link] Ignoring {} on '{}' for channel '{}' (listening to {} on '{}')",
                event.operation,
                event.table,
                self.channel_id,
                self.event_mask,
                self.table
            );
            return;
        }
        if let Err(e) = event.validate() {
            self.mark_dropped();
            log::warn!("[civic-link] Malformed event on '{}': {}", self.channel_id, e);
            self.report_error(e);
            return;
        }

        match &self.debouncer {
            Some(debouncer) => {
                let target = Arc::downgrade(self);
                let outcome = debouncer.push(event, move |seq| {
                    if let Some(dispatcher) = target.upgrade() {
                        dispatcher.flush_debounced(seq);
                    }
                });
                match outcome {
                    Push::Scheduled => log::trace!(
                        "[civic-link] Debouncing '{}' for {:?}",
                        self.channel_id,
                        debouncer.window()
                    ),
                    Push::Coalesced | Push::Rejected => self.mark_dropped(),
                }
            },
            None => self.deliver(event),
        }
    }

    fn flush_debounced(&self, seq: u64) {
        let ready = self.debouncer.as_ref().and_then(|d| d.take_ready(seq));
        if let Some(event) = ready {
            self.deliver(event);
        }
    }

    fn deliver(&self, event: ChangeEvent) {
        let Some(_guard) = self.gate.enter() else {
            self.mark_dropped();
            return;
        };
        if !self.is_live() {
            self.mark_dropped();
            return;
        }
        self.last_event_time_ms
            .store(self.clock.now_ms().max(1), Ordering::Relaxed);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.handlers.emit_change(event) {
            log::warn!("[civic-link] {} (channel '{}')", e, self.channel_id);
            self.report_error(e);
        }
    }

    fn report_error(&self, error: LinkError) {
        if let Some(_guard) = self.gate.enter() {
            self.handlers.emit_error(error);
        }
    }

    fn report_status(&self, status: SubscriptionStatus) {
        let Some(_guard) = self.gate.enter() else {
            return;
        };
        self.emit_status(status);
    }

    fn emit_status(&self, status: SubscriptionStatus) {
        if let Err(e) = self.handlers.emit_status(status) {
            log::warn!("[civic-link] {} (channel '{}')", e, self.channel_id);
            self.handlers.emit_error(e);
        }
    }

    /// Move to `next` unless closed or already there. Returns `true` on change.
    fn transition(&self, next: SubscriptionStatus) -> bool {
        let mut current = self.status.load(Ordering::SeqCst);
        loop {
            let state = SubscriptionStatus::from_u8(current);
            if state == SubscriptionStatus::Closed || state == next {
                return false;
            }
            match self.status.compare_exchange(
                current,
                next.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Report the initial `pending` state.
    pub(crate) fn announce_pending(&self) {
        if self.is_live() {
            self.report_status(SubscriptionStatus::Pending);
        }
    }

    /// Entry point for the transport's subscribe callback.
    pub(crate) fn on_transport_status(&self, status: ChannelStatus, error: Option<String>) {
        if !self.is_live() {
            return;
        }
        match status {
            ChannelStatus::Connecting => {},
            ChannelStatus::Connected => {
                if self.transition(SubscriptionStatus::Connected) {
                    log::debug!("[civic-link] Channel '{}' connected", self.channel_id);
                    self.report_status(SubscriptionStatus::Connected);
                }
            },
            ChannelStatus::Error | ChannelStatus::Closed => {
                let message = match (status, error) {
                    (_, Some(msg)) => msg,
                    (ChannelStatus::Closed, None) => "channel closed by remote".to_string(),
                    (_, None) => "channel error".to_string(),
                };
                self.fail(message);
            },
        }
    }

    /// Fail the subscription if it never got past `pending`.
    pub(crate) fn on_subscribe_timeout(&self, timeout: Duration) {
        if self.is_live() && self.status() == SubscriptionStatus::Pending {
            self.fail(format!("subscribe timed out after {:?}", timeout));
        }
    }

    fn fail(&self, message: String) {
        if self.transition(SubscriptionStatus::Error) {
            log::warn!("[civic-link] Channel '{}' failed: {}", self.channel_id, message);
            self.report_status(SubscriptionStatus::Error);
            self.report_error(LinkError::TransportError(format!(
                "{}: {}",
                self.channel_id, message
            )));
        }
    }

    /// Move to `Closed`, cancel pending debounce work and wait for handlers
    /// still running on other threads.
    ///
    /// Returns `true` if this call performed the transition.
    pub(crate) fn shutdown(&self) -> bool {
        let previous = self
            .status
            .swap(SubscriptionStatus::Closed.as_u8(), Ordering::SeqCst);
        if let Some(debouncer) = &self.debouncer {
            debouncer.close();
        }
        self.gate.close();
        SubscriptionStatus::from_u8(previous) != SubscriptionStatus::Closed
    }

    /// Report the final `closed` state. Called once, right after `shutdown`.
    pub(crate) fn announce_closed(&self) {
        self.emit_status(SubscriptionStatus::Closed);
    }

    pub(crate) fn info(&self) -> SubscriptionInfo {
        let last = self.last_event_time_ms.load(Ordering::Relaxed);
        SubscriptionInfo {
            channel_id: self.channel_id.clone(),
            table: self.table.clone(),
            status: self.status(),
            generation: self.generation,
            created_at_ms: self.created_at_ms,
            last_event_time_ms: (last != 0).then_some(last),
            events_delivered: self.delivered.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            debounced: self.debouncer.is_some(),
        }
    }
}
