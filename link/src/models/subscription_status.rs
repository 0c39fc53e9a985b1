use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one subscription.
///
/// `Pending -> Connected` on acknowledgment, `Pending | Connected -> Error` on
/// transport failure, and any state `-> Closed` on teardown. `Closed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Connected,
    Error,
    Closed,
}

impl SubscriptionStatus {
    /// `true` while the subscription may still deliver events.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Connected)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Connected => 1,
            Self::Error => 2,
            Self::Closed => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Connected,
            2 => Self::Error,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
