//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] provides a read-only snapshot of a subscription's
//! state, useful for debugging, tests and the opt-in diagnostics dump.

use serde::{Deserialize, Serialize};

use super::subscription_status::SubscriptionStatus;

/// Read-only snapshot of a subscription's metadata.
///
/// Returned by [`SubscriptionManager::subscriptions()`](crate::SubscriptionManager::subscriptions)
/// and [`SubscriptionHandle::info()`](crate::SubscriptionHandle::info).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub channel_id: String,
    pub table: String,
    pub status: SubscriptionStatus,
    /// Incremented every time the same `channel_id` is re-opened.
    pub generation: u64,
    /// Timestamp (millis since Unix epoch) when the subscription was opened.
    pub created_at_ms: u64,
    /// Timestamp (millis since Unix epoch) of the last delivered event.
    pub last_event_time_ms: Option<u64>,
    pub events_delivered: u64,
    /// Events suppressed after teardown, filtered out, coalesced or malformed.
    pub events_dropped: u64,
    pub debounced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_info_serializes_status_in_snake_case() {
        let info = SubscriptionInfo {
            channel_id: "issues".to_string(),
            table: "issues".to_string(),
            status: SubscriptionStatus::Connected,
            generation: 3,
            created_at_ms: 1_700_000_000_000,
            last_event_time_ms: None,
            events_delivered: 12,
            events_dropped: 1,
            debounced: false,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"status\":\"connected\""));
        let back: SubscriptionInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
