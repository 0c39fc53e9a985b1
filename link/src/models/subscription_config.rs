use std::time::Duration;

use super::change_operation::EventMask;
use super::row_filter::RowFilter;
use crate::error::{LinkError, Result};

/// Configuration for one change-feed subscription.
///
/// # Example
///
/// ```rust
/// use civic_link::{ChangeOperation, EventMask, SubscriptionConfig};
///
/// let config = SubscriptionConfig::new("comments-42", "comments")
///     .with_events(EventMask::only(&[ChangeOperation::Insert, ChangeOperation::Delete]))
///     .with_filter("issue_id=eq.42")
///     .with_debounce();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionConfig {
    /// Unique per logical feed + filter combination
    pub channel_id: String,
    /// Table whose changes are streamed
    pub table: String,
    /// Database schema (default: `public`)
    pub schema: String,
    /// Operations to listen for
    pub event_mask: EventMask,
    /// Optional server-side predicate in `column=op.value` form
    pub filter: Option<String>,
    /// Coalesce bursts of change events into the last one
    pub debounce: bool,
    /// Override for the manager's default debounce window
    pub debounce_window: Option<Duration>,
}

impl SubscriptionConfig {
    /// Listen for every operation on `table`.
    pub fn new(channel_id: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            table: table.into(),
            schema: "public".to_string(),
            event_mask: EventMask::all(),
            filter: None,
            debounce: false,
            debounce_window: None,
        }
    }

    pub fn with_events(mut self, mask: EventMask) -> Self {
        self.event_mask = mask;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Debounce using the manager's default window.
    pub fn with_debounce(mut self) -> Self {
        self.debounce = true;
        self
    }

    /// Debounce using an explicit window.
    pub fn with_debounce_window(mut self, window: Duration) -> Self {
        self.debounce = true;
        self.debounce_window = Some(window);
        self
    }

    /// Parsed form of [`filter`](Self::filter), if any.
    pub fn row_filter(&self) -> Result<Option<RowFilter>> {
        self.filter.as_deref().map(RowFilter::parse).transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_id.trim().is_empty() {
            return Err(LinkError::ConfigurationError(
                "channel_id must not be empty".to_string(),
            ));
        }
        if self.table.trim().is_empty() {
            return Err(LinkError::ConfigurationError(format!(
                "table must not be empty (channel '{}')",
                self.channel_id
            )));
        }
        if self.event_mask.is_empty() {
            return Err(LinkError::ConfigurationError(format!(
                "event mask for channel '{}' selects no operations",
                self.channel_id
            )));
        }
        if matches!(self.debounce_window, Some(w) if w.is_zero()) {
            return Err(LinkError::ConfigurationError(format!(
                "debounce window for channel '{}' must be > 0",
                self.channel_id
            )));
        }
        self.row_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SubscriptionConfig::new("issues", "issues");
        assert_eq!(config.schema, "public");
        assert!(config.event_mask.is_all());
        assert!(config.filter.is_none());
        assert!(!config.debounce);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(SubscriptionConfig::new("", "issues").validate().is_err());
        assert!(SubscriptionConfig::new("issues", " ").validate().is_err());
        assert!(SubscriptionConfig::new("issues", "issues")
            .with_events(EventMask::none())
            .validate()
            .is_err());
        assert!(SubscriptionConfig::new("issues", "issues")
            .with_filter("status")
            .validate()
            .is_err());
        assert!(SubscriptionConfig::new("issues", "issues")
            .with_debounce_window(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_debounce_window_override_enables_debounce() {
        let config = SubscriptionConfig::new("issues", "issues")
            .with_debounce_window(Duration::from_millis(50));
        assert!(config.debounce);
        assert_eq!(config.debounce_window, Some(Duration::from_millis(50)));
    }
}
