//! Remote channel collaborator.
//!
//! The subscription layer talks to the backend's change feed only through
//! [`RealtimeTransport`] and [`RemoteChannel`]. A hosted realtime service, a
//! WebSocket client or the in-process [`MemoryTransport`] can sit behind them.
//!
//! Contract expected by the subscription layer:
//!
//! - at-least-once delivery of change events while connected
//! - delivery ceases (eventually) after [`RealtimeTransport::remove_channel`]
//! - removing an already-removed channel is safe
//! - callbacks may fire on any thread, possibly before `subscribe` returns

mod memory;

pub use memory::{MemoryChannel, MemoryTransport};

use std::fmt;
use std::sync::Arc;

use crate::models::{ChangeEvent, EventMask};

/// Status reported by a channel's subscribe callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Error,
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Connected => write!(f, "connected"),
            ChannelStatus::Error => write!(f, "error"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// What a channel should stream: table, operations, schema and optional predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFeedFilter {
    pub table: String,
    pub events: EventMask,
    pub schema: String,
    pub filter: Option<String>,
}

/// Push callback registered with [`RemoteChannel::on_change_feed`].
pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Status callback registered with [`RemoteChannel::subscribe`].
/// The second argument carries the transport's error description, if any.
pub type StatusCallback = Arc<dyn Fn(ChannelStatus, Option<String>) + Send + Sync>;

/// One logical connection to the change feed.
pub trait RemoteChannel: Send + Sync {
    /// Identifier the channel was opened with.
    fn id(&self) -> &str;

    /// Register a push-notification handler for the given feed.
    fn on_change_feed(&self, filter: ChangeFeedFilter, callback: ChangeCallback);

    /// Activate the channel. Completion is reported through `callback`.
    fn subscribe(&self, callback: StatusCallback);
}

/// Factory and teardown for [`RemoteChannel`]s.
pub trait RealtimeTransport: Send + Sync {
    /// Create a channel. Nothing is sent until [`RemoteChannel::subscribe`].
    fn open_channel(&self, channel_id: &str) -> Arc<dyn RemoteChannel>;

    /// Tear down server-side and local resources for a channel.
    ///
    /// Returns immediately; the remote side may finish disconnecting later.
    fn remove_channel(&self, channel: &Arc<dyn RemoteChannel>);
}
