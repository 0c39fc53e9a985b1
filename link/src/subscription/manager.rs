//! `SubscriptionManager` – owner of every live change-feed subscription for
//! one consumer.
//!
//! Guarantees:
//! - at most one live channel per `channel_id`; re-opening tears the old one
//!   down before the new one is set up
//! - once `close`/`close_all` returns, no handler of the closed subscription
//!   runs again, even for events already in flight
//! - transport failures and handler panics are delivered to `on_error`,
//!   never returned or propagated across the dispatch boundary

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::debounce::Debouncer;
use super::dispatch::Dispatcher;
use super::handle::SubscriptionHandle;
use crate::clock::{Clock, SystemClock};
use crate::error::{LinkError, Result};
use crate::event_handlers::SubscriptionHandlers;
use crate::models::{ChangeEvent, SubscriptionConfig, SubscriptionInfo, SubscriptionStatus};
use crate::timeouts::LinkTimeouts;
use crate::transport::{ChangeFeedFilter, ChannelStatus, RealtimeTransport, RemoteChannel};

// ── Per-subscription state ──────────────────────────────────────────────────

struct SubEntry {
    generation: u64,
    channel: Arc<dyn RemoteChannel>,
    dispatcher: Arc<Dispatcher>,
    timeout_task: Option<JoinHandle<()>>,
}

pub(crate) struct ManagerInner {
    transport: Arc<dyn RealtimeTransport>,
    timeouts: LinkTimeouts,
    clock: Arc<dyn Clock>,
    /// Cleared by `close_all`; checked by every dispatcher before delivery.
    alive: Arc<AtomicBool>,
    subs: Mutex<HashMap<String, SubEntry>>,
    next_generation: AtomicU64,
}

impl ManagerInner {
    fn lock_subs(&self) -> MutexGuard<'_, HashMap<String, SubEntry>> {
        self.subs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Close the local state first, then ask the transport to remove the
    /// channel, then report `closed`.
    fn teardown(&self, entry: SubEntry) {
        if let Some(task) = entry.timeout_task {
            task.abort();
        }
        let closed_now = entry.dispatcher.shutdown();
        self.transport.remove_channel(&entry.channel);
        if closed_now {
            log::debug!(
                "[civic-link] Closed subscription '{}' (gen={})",
                entry.dispatcher.channel_id(),
                entry.generation
            );
            entry.dispatcher.announce_closed();
        }
    }

    fn close(&self, channel_id: &str) -> bool {
        let entry = self.lock_subs().remove(channel_id);
        match entry {
            Some(entry) => {
                self.teardown(entry);
                true
            },
            None => false,
        }
    }

    /// Close `channel_id` only if it is still the given generation.
    pub(crate) fn close_generation(&self, channel_id: &str, generation: u64) {
        let entry = {
            let mut subs = self.lock_subs();
            match subs.get(channel_id) {
                Some(e) if e.generation == generation => subs.remove(channel_id),
                _ => None,
            }
        };
        match entry {
            Some(entry) => self.teardown(entry),
            None => log::debug!(
                "[civic-link] Ignoring stale close for '{}' (gen={})",
                channel_id,
                generation
            ),
        }
    }

    fn close_all(&self) -> usize {
        self.alive.store(false, Ordering::SeqCst);
        let entries: Vec<SubEntry> = self.lock_subs().drain().map(|(_, e)| e).collect();
        let count = entries.len();
        for entry in entries {
            self.teardown(entry);
        }
        count
    }
}

// ── SubscriptionManager (public handle) ─────────────────────────────────────

/// Owns the change-feed subscriptions of one consumer (a view, a screen, a
/// background sync task).
///
/// Each consumer should own its own manager; channels are never shared
/// between managers. Dropping the manager closes everything it owns.
///
/// # Examples
///
/// ```rust
/// use civic_link::{
///     ChangeEvent, MemoryTransport, Row, SubscriptionConfig, SubscriptionHandlers,
///     SubscriptionManager, SubscriptionStatus,
/// };
/// use std::sync::{Arc, Mutex};
///
/// let transport = MemoryTransport::new();
/// let manager = SubscriptionManager::new(Arc::new(transport.clone()));
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let handle = manager
///     .open(
///         SubscriptionConfig::new("issues", "issues"),
///         SubscriptionHandlers::new().on_change(move |event| sink.lock().unwrap().push(event)),
///     )
///     .unwrap();
/// assert_eq!(handle.status(), SubscriptionStatus::Connected);
///
/// let row: Row = [("id".to_string(), serde_json::json!(1))].into_iter().collect();
/// transport.push("issues", ChangeEvent::insert("issues", row, 0));
/// assert_eq!(seen.lock().unwrap().len(), 1);
///
/// manager.close("issues");
/// assert!(!handle.is_active());
/// ```
pub struct SubscriptionManager {
    inner: Arc<ManagerInner>,
}

impl SubscriptionManager {
    /// Manager with default timeouts and the system clock.
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self::from_parts(transport, LinkTimeouts::default(), Arc::new(SystemClock))
    }

    /// Create a new builder for configuring the manager.
    pub fn builder() -> SubscriptionManagerBuilder {
        SubscriptionManagerBuilder::default()
    }

    fn from_parts(
        transport: Arc<dyn RealtimeTransport>,
        timeouts: LinkTimeouts,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                timeouts,
                clock,
                alive: Arc::new(AtomicBool::new(true)),
                subs: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Open a subscription, replacing any existing one with the same `channel_id`.
    ///
    /// Returns as soon as the channel request has been issued; the outcome is
    /// reported later through `on_status` / `on_error`. Fails synchronously
    /// only for invalid configuration (including debouncing without a Tokio
    /// runtime) or after [`close_all`](Self::close_all).
    pub fn open(
        &self,
        config: SubscriptionConfig,
        handlers: SubscriptionHandlers,
    ) -> Result<SubscriptionHandle> {
        if !self.is_alive() {
            return Err(LinkError::ManagerClosed);
        }
        config.validate()?;

        let runtime = Handle::try_current().ok();
        let debouncer = if config.debounce {
            let runtime = runtime.clone().ok_or_else(|| {
                LinkError::ConfigurationError(format!(
                    "debounced subscription '{}' requires a Tokio runtime",
                    config.channel_id
                ))
            })?;
            let window = config
                .debounce_window
                .unwrap_or(self.inner.timeouts.debounce_window);
            Some(Debouncer::new(window, runtime))
        } else {
            None
        };

        // Old channel is fully torn down before the new one is requested.
        let previous = self.inner.lock_subs().remove(&config.channel_id);
        if let Some(previous) = previous {
            log::debug!(
                "[civic-link] Replacing existing subscription '{}' (gen={})",
                config.channel_id,
                previous.generation
            );
            self.inner.teardown(previous);
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(
            config.channel_id.clone(),
            config.table.clone(),
            config.event_mask,
            generation,
            handlers,
            self.inner.alive.clone(),
            debouncer,
            self.inner.clock.clone(),
        );
        dispatcher.announce_pending();

        let channel = self.inner.transport.open_channel(&config.channel_id);
        let change_target = Arc::downgrade(&dispatcher);
        channel.on_change_feed(
            ChangeFeedFilter {
                table: config.table.clone(),
                events: config.event_mask,
                schema: config.schema.clone(),
                filter: config.filter.clone(),
            },
            Arc::new(move |event: ChangeEvent| {
                if let Some(dispatcher) = change_target.upgrade() {
                    dispatcher.receive(event);
                }
            }),
        );
        let status_target = Arc::downgrade(&dispatcher);
        channel.subscribe(Arc::new(move |status: ChannelStatus, error: Option<String>| {
            if let Some(dispatcher) = status_target.upgrade() {
                dispatcher.on_transport_status(status, error);
            }
        }));

        let timeout = self.inner.timeouts.subscribe_timeout;
        let timeout_task = match runtime {
            Some(rt)
                if !LinkTimeouts::is_no_timeout(timeout)
                    && dispatcher.status() == SubscriptionStatus::Pending =>
            {
                let target = Arc::downgrade(&dispatcher);
                Some(rt.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(dispatcher) = target.upgrade() {
                        dispatcher.on_subscribe_timeout(timeout);
                    }
                }))
            },
            None if dispatcher.status() == SubscriptionStatus::Pending => {
                log::debug!(
                    "[civic-link] No Tokio runtime; subscribe timeout disabled for '{}'",
                    config.channel_id
                );
                None
            },
            _ => None,
        };

        log::debug!(
            "[civic-link] Opened subscription '{}' on {}.{} events={} (gen={})",
            config.channel_id,
            config.schema,
            config.table,
            config.event_mask,
            generation
        );

        let entry = SubEntry {
            generation,
            channel,
            dispatcher: dispatcher.clone(),
            timeout_task,
        };
        let raced = self.inner.lock_subs().insert(config.channel_id.clone(), entry);
        if let Some(raced) = raced {
            self.inner.teardown(raced);
        }
        if !self.is_alive() {
            // close_all ran while we were opening
            self.inner.close_generation(&config.channel_id, generation);
            return Err(LinkError::ManagerClosed);
        }

        Ok(SubscriptionHandle::new(dispatcher, Arc::downgrade(&self.inner)))
    }

    /// Close the subscription for `channel_id`.
    ///
    /// Unknown or already-closed ids are a no-op. Returns `true` if a
    /// subscription was closed by this call.
    pub fn close(&self, channel_id: &str) -> bool {
        self.inner.close(channel_id)
    }

    /// Close every subscription and mark the manager as torn down.
    ///
    /// Subsequent `open` calls fail with [`LinkError::ManagerClosed`].
    /// Returns the number of subscriptions closed.
    pub fn close_all(&self) -> usize {
        let count = self.inner.close_all();
        if count > 0 {
            log::debug!("[civic-link] Closed {} subscription(s) on teardown", count);
        }
        count
    }

    /// `false` once [`close_all`](Self::close_all) has run.
    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }

    /// `true` if `channel_id` is open and pending or connected.
    pub fn is_active(&self, channel_id: &str) -> bool {
        self.inner
            .lock_subs()
            .get(channel_id)
            .map_or(false, |e| e.dispatcher.is_active())
    }

    /// Current status of `channel_id`, or `None` if it is not open.
    pub fn status(&self, channel_id: &str) -> Option<SubscriptionStatus> {
        self.inner
            .lock_subs()
            .get(channel_id)
            .map(|e| e.dispatcher.status())
    }

    /// Snapshot of every open subscription, ordered by `channel_id`.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .inner
            .lock_subs()
            .values()
            .map(|e| e.dispatcher.info())
            .collect();
        infos.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        infos
    }

    pub fn len(&self) -> usize {
        self.inner.lock_subs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &LinkTimeouts {
        &self.inner.timeouts
    }

    /// Log one line per open subscription. Never runs on its own.
    pub fn log_diagnostics(&self) {
        let infos = self.subscriptions();
        log::info!(
            "[civic-link] {} open subscription(s), manager alive={}",
            infos.len(),
            self.is_alive()
        );
        for info in infos {
            log::info!(
                "[civic-link]   '{}' table={} status={} gen={} delivered={} dropped={} debounced={}",
                info.channel_id,
                info.table,
                info.status,
                info.generation,
                info.events_delivered,
                info.events_dropped,
                info.debounced
            );
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.inner.close_all();
    }
}

/// Builder for [`SubscriptionManager`].
///
/// # Example
///
/// ```rust
/// use civic_link::{LinkTimeouts, ManualClock, MemoryTransport, SubscriptionManager};
/// use std::sync::Arc;
///
/// let manager = SubscriptionManager::builder()
///     .transport(Arc::new(MemoryTransport::new()))
///     .timeouts(LinkTimeouts::fast())
///     .clock(ManualClock::new(0))
///     .build()
///     .unwrap();
/// assert!(manager.is_empty());
/// ```
#[derive(Default)]
pub struct SubscriptionManagerBuilder {
    transport: Option<Arc<dyn RealtimeTransport>>,
    timeouts: LinkTimeouts,
    clock: Option<Arc<dyn Clock>>,
}

impl SubscriptionManagerBuilder {
    pub fn transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Result<SubscriptionManager> {
        let transport = self.transport.ok_or_else(|| {
            LinkError::ConfigurationError("a realtime transport is required".to_string())
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(SubscriptionManager::from_parts(transport, self.timeouts, clock))
    }
}
