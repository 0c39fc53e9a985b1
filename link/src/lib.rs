//! # civic-link
//!
//! Realtime client core for the civic issue tracker.
//!
//! ## Components
//!
//! - [`SubscriptionManager`]: one live change-feed channel per logical
//!   subscription, liveness-gated dispatch, optional debouncing
//! - [`RateLimiter`]: sliding-window limiter with cool-down for client actions
//! - [`PaginationController`]: clamp-don't-throw page/offset derivation
//!
//! The remote change feed is reached through the [`RealtimeTransport`] /
//! [`RemoteChannel`] traits; [`MemoryTransport`] is an in-process
//! implementation for tests and offline hosts.
//!
//! ## Example
//!
//! ```rust
//! use civic_link::{
//!     EventMask, ChangeOperation, MemoryTransport, SubscriptionConfig,
//!     SubscriptionHandlers, SubscriptionManager,
//! };
//! use std::sync::Arc;
//!
//! let transport = MemoryTransport::new();
//! let manager = SubscriptionManager::new(Arc::new(transport));
//!
//! let handle = manager
//!     .open(
//!         SubscriptionConfig::new("comments-42", "comments")
//!             .with_events(EventMask::only(&[ChangeOperation::Insert]))
//!             .with_filter("issue_id=eq.42"),
//!         SubscriptionHandlers::new()
//!             .on_insert(|event| println!("new comment: {:?}", event.new_row))
//!             .on_error(|err| eprintln!("feed error: {}", err)),
//!     )
//!     .unwrap();
//! assert!(handle.is_active());
//!
//! manager.close_all();
//! assert!(!handle.is_active());
//! ```

pub mod clock;
pub mod error;
pub mod event_handlers;
pub mod limiter;
pub mod live_rows;
pub mod models;
pub mod pagination;
pub mod subscription;
pub mod timeouts;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LinkError, Result};
pub use event_handlers::{
    OnChangeCallback, OnErrorCallback, OnStatusCallback, SubscriptionEvent, SubscriptionHandlers,
};
pub use limiter::{GatedAction, RateLimitConfig, RateLimitStatus, RateLimiter};
pub use live_rows::LiveRows;
pub use models::{
    ChangeEvent, ChangeOperation, EventMask, FilterOp, Row, RowFilter, SubscriptionConfig,
    SubscriptionInfo, SubscriptionStatus,
};
pub use pagination::{PaginationConfig, PaginationController, PaginationState};
pub use subscription::{SubscriptionHandle, SubscriptionManager, SubscriptionManagerBuilder};
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};
pub use transport::{
    ChangeCallback, ChangeFeedFilter, ChannelStatus, MemoryChannel, MemoryTransport,
    RealtimeTransport, RemoteChannel, StatusCallback,
};
