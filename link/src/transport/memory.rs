//! In-process transport.
//!
//! Tracks live channels plus per-id open/remove counters. Removed channels
//! are forgotten; a caller that still holds an `Arc<MemoryChannel>` can use
//! it to replay events that were in flight when the channel was removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    ChangeCallback, ChangeFeedFilter, ChannelStatus, RealtimeTransport, RemoteChannel,
    StatusCallback,
};
use crate::models::{ChangeEvent, RowFilter};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Feed {
    filter: ChangeFeedFilter,
    row_filter: Option<RowFilter>,
    callback: ChangeCallback,
}

impl Feed {
    fn accepts(&self, event: &ChangeEvent) -> bool {
        if self.filter.table != event.table || !self.filter.events.contains(event.operation) {
            return false;
        }
        match (&self.row_filter, event.row()) {
            (Some(rf), Some(row)) => rf.matches(row),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Channel created by [`MemoryTransport`].
pub struct MemoryChannel {
    id: String,
    serial: u64,
    auto_connect: bool,
    feeds: Mutex<Vec<Feed>>,
    status_callback: Mutex<Option<StatusCallback>>,
    removed: AtomicBool,
}

impl MemoryChannel {
    /// Position of this channel in the transport's open order.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.status_callback).is_some()
    }

    /// Deliver an event to every matching feed, even if the channel was
    /// already removed (simulates an event that was in flight).
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        let callbacks: Vec<ChangeCallback> = lock(&self.feeds)
            .iter()
            .filter(|feed| feed.accepts(&event))
            .map(|feed| feed.callback.clone())
            .collect();
        for cb in &callbacks {
            cb(event.clone());
        }
        callbacks.len()
    }

    /// Invoke the subscribe callback. Returns `false` if `subscribe` was never called.
    pub fn report_status(&self, status: ChannelStatus, error: Option<String>) -> bool {
        let callback = lock(&self.status_callback).clone();
        match callback {
            Some(cb) => {
                cb(status, error);
                true
            },
            None => false,
        }
    }
}

impl RemoteChannel for MemoryChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_change_feed(&self, filter: ChangeFeedFilter, callback: ChangeCallback) {
        let row_filter = match filter.filter.as_deref().map(RowFilter::parse).transpose() {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("[civic-link] Ignoring filter on channel '{}': {}", self.id, e);
                None
            },
        };
        lock(&self.feeds).push(Feed {
            filter,
            row_filter,
            callback,
        });
    }

    fn subscribe(&self, callback: StatusCallback) {
        *lock(&self.status_callback) = Some(callback.clone());
        if self.auto_connect {
            callback(ChannelStatus::Connecting, None);
            callback(ChannelStatus::Connected, None);
        }
    }
}

#[derive(Default)]
struct MemoryState {
    /// Live channels only.
    channels: Vec<Arc<MemoryChannel>>,
    next_serial: u64,
    opened: HashMap<String, usize>,
    removed: HashMap<String, usize>,
}

struct MemoryInner {
    auto_connect: bool,
    state: Mutex<MemoryState>,
}

/// [`RealtimeTransport`] that lives entirely in memory.
///
/// # Example
///
/// ```rust
/// use civic_link::{MemoryTransport, SubscriptionConfig, SubscriptionHandlers, SubscriptionManager};
/// use std::sync::Arc;
///
/// let transport = MemoryTransport::new();
/// let manager = SubscriptionManager::new(Arc::new(transport.clone()));
/// let handle = manager
///     .open(SubscriptionConfig::new("issues", "issues"), SubscriptionHandlers::new())
///     .unwrap();
/// assert!(handle.is_active());
/// assert_eq!(transport.live_count("issues"), 1);
///
/// handle.close();
/// assert_eq!(transport.live_count("issues"), 0);
/// ```
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Channels report `connecting` then `connected` as soon as they are subscribed.
    pub fn new() -> Self {
        Self::with_auto_connect(true)
    }

    /// Channels stay `pending` until [`connect`](Self::connect) or [`fail`](Self::fail).
    pub fn manual() -> Self {
        Self::with_auto_connect(false)
    }

    fn with_auto_connect(auto_connect: bool) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                auto_connect,
                state: Mutex::new(MemoryState::default()),
            }),
        }
    }

    /// Deliver an event through every live channel opened under `channel_id`.
    pub fn push(&self, channel_id: &str, event: ChangeEvent) -> usize {
        self.live_channels(channel_id)
            .iter()
            .map(|channel| channel.emit(event.clone()))
            .sum()
    }

    /// Report `connected` on every live channel opened under `channel_id`.
    pub fn connect(&self, channel_id: &str) -> bool {
        self.report(channel_id, ChannelStatus::Connected, None)
    }

    /// Report a transport error on every live channel opened under `channel_id`.
    pub fn fail(&self, channel_id: &str, message: impl Into<String>) -> bool {
        self.report(channel_id, ChannelStatus::Error, Some(message.into()))
    }

    /// Report a remote-initiated close on every live channel opened under `channel_id`.
    pub fn drop_remote(&self, channel_id: &str) -> bool {
        self.report(channel_id, ChannelStatus::Closed, None)
    }

    fn report(&self, channel_id: &str, status: ChannelStatus, error: Option<String>) -> bool {
        self.live_channels(channel_id)
            .iter()
            .fold(false, |any, ch| ch.report_status(status, error.clone()) || any)
    }

    /// Most recently opened live channel with this id.
    pub fn channel(&self, channel_id: &str) -> Option<Arc<MemoryChannel>> {
        lock(&self.inner.state)
            .channels
            .iter()
            .rev()
            .find(|ch| ch.id == channel_id)
            .cloned()
    }

    /// Live channels opened with this id, in open order.
    pub fn channels(&self, channel_id: &str) -> Vec<Arc<MemoryChannel>> {
        lock(&self.inner.state)
            .channels
            .iter()
            .filter(|ch| ch.id == channel_id)
            .cloned()
            .collect()
    }

    fn live_channels(&self, channel_id: &str) -> Vec<Arc<MemoryChannel>> {
        self.channels(channel_id)
    }

    pub fn open_count(&self, channel_id: &str) -> usize {
        lock(&self.inner.state).opened.get(channel_id).copied().unwrap_or(0)
    }

    pub fn remove_count(&self, channel_id: &str) -> usize {
        lock(&self.inner.state).removed.get(channel_id).copied().unwrap_or(0)
    }

    /// Channels opened under `channel_id` and not yet removed.
    pub fn live_count(&self, channel_id: &str) -> usize {
        self.live_channels(channel_id).len()
    }

    /// Channels not yet removed, across all ids.
    pub fn total_live(&self) -> usize {
        lock(&self.inner.state).channels.len()
    }
}

impl RealtimeTransport for MemoryTransport {
    fn open_channel(&self, channel_id: &str) -> Arc<dyn RemoteChannel> {
        let mut state = lock(&self.inner.state);
        state.next_serial += 1;
        let channel = Arc::new(MemoryChannel {
            id: channel_id.to_string(),
            serial: state.next_serial,
            auto_connect: self.inner.auto_connect,
            feeds: Mutex::new(Vec::new()),
            status_callback: Mutex::new(None),
            removed: AtomicBool::new(false),
        });
        state.channels.push(channel.clone());
        *state.opened.entry(channel_id.to_string()).or_insert(0) += 1;
        channel
    }

    fn remove_channel(&self, channel: &Arc<dyn RemoteChannel>) {
        let target = Arc::as_ptr(channel) as *const ();
        let found = {
            let mut state = lock(&self.inner.state);
            let position = state
                .channels
                .iter()
                .position(|ch| Arc::as_ptr(ch) as *const () == target);
            match position {
                Some(i) => {
                    let ch = state.channels.remove(i);
                    ch.removed.store(true, Ordering::SeqCst);
                    *state.removed.entry(ch.id.clone()).or_insert(0) += 1;
                    Some(ch)
                },
                None => None,
            }
        };
        // Mirrors a hosted feed acknowledging the teardown.
        if let Some(ch) = found {
            ch.report_status(ChannelStatus::Closed, None);
        }
    }
}
