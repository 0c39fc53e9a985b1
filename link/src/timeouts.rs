//! Timing configuration for realtime subscriptions.
//!
//! Centralizes the subscribe acknowledgment timeout and the default debounce
//! window used by debounced subscriptions.

use std::time::Duration;

/// Default window for coalescing bursts of change events.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Timing configuration for a [`SubscriptionManager`](crate::SubscriptionManager).
///
/// # Examples
///
/// ```rust
/// use civic_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = LinkTimeouts::default();
///
/// // Longer acknowledgment wait for flaky mobile networks
/// let timeouts = LinkTimeouts::builder()
///     .subscribe_timeout(Duration::from_secs(30))
///     .debounce_window_ms(500)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// How long a channel may stay `pending` before it is moved to `error`.
    /// Set to 0 to wait indefinitely.
    /// Default: 10 seconds
    pub subscribe_timeout: Duration,

    /// Coalescing window for subscriptions opened with `with_debounce()`.
    /// Default: 300 milliseconds
    pub debounce_window: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(10),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }
}

impl LinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Short timeouts for local development against a nearby backend.
    pub fn fast() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(3),
            debounce_window: Duration::from_millis(100),
        }
    }

    /// Long timeouts for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(30),
            debounce_window: Duration::from_millis(500),
        }
    }

    /// Timeouts for tests that drive a paused Tokio clock.
    pub fn for_testing(subscribe_timeout_ms: u64) -> Self {
        Self {
            subscribe_timeout: Duration::from_millis(subscribe_timeout_ms),
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Builder for creating custom [`LinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    /// Set the subscribe acknowledgment timeout.
    /// Set to 0 to disable.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the subscribe acknowledgment timeout in seconds.
    pub fn subscribe_timeout_secs(self, secs: u64) -> Self {
        self.subscribe_timeout(Duration::from_secs(secs))
    }

    /// Set the default debounce window.
    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.timeouts.debounce_window = window;
        self
    }

    /// Set the default debounce window in milliseconds.
    pub fn debounce_window_ms(self, ms: u64) -> Self {
        self.debounce_window(Duration::from_millis(ms))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}
