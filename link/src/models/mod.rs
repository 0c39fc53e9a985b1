//! Data models for the civic-link client library.
//!
//! Defines change-feed events, subscription configuration and the snapshot
//! types returned to callers.

pub mod change_event;
pub mod change_operation;
pub mod row_filter;
pub mod subscription_config;
pub mod subscription_info;
pub mod subscription_status;

pub use change_event::{ChangeEvent, Row};
pub use change_operation::{ChangeOperation, EventMask};
pub use row_filter::{FilterOp, RowFilter};
pub use subscription_config::SubscriptionConfig;
pub use subscription_info::SubscriptionInfo;
pub use subscription_status::SubscriptionStatus;
