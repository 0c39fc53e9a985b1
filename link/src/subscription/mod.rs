//! Change-feed subscription management.
//!
//! This module contains:
//! - [`SubscriptionManager`]: owns every subscription of one consumer
//! - [`SubscriptionHandle`]: generation-tagged handle returned by `open`
//! - `dispatch`: per-subscription liveness-gated delivery
//! - `gate`: makes close wait for handlers running on other threads
//! - `debounce`: trailing-edge coalescing of bursty feeds

mod debounce;
mod dispatch;
mod gate;
mod handle;
mod manager;

pub use handle::SubscriptionHandle;
pub use manager::{SubscriptionManager, SubscriptionManagerBuilder};
