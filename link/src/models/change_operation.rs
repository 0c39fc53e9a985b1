use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;

/// Kind of row change carried by a [`ChangeEvent`](super::ChangeEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub const ALL: [ChangeOperation; 3] = [Self::Insert, Self::Update, Self::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(LinkError::ConfigurationError(format!(
                "Unknown change operation '{}'",
                other
            ))),
        }
    }
}

/// Set of operations a subscription listens for.
///
/// Renders as `*` when every operation is selected, otherwise as a
/// comma-separated list such as `INSERT,DELETE`.
///
/// # Example
///
/// ```rust
/// use civic_link::{ChangeOperation, EventMask};
///
/// let mask = EventMask::only(&[ChangeOperation::Insert, ChangeOperation::Delete]);
/// assert!(mask.contains(ChangeOperation::Delete));
/// assert!(!mask.contains(ChangeOperation::Update));
/// assert_eq!(mask.to_string(), "INSERT,DELETE");
/// assert_eq!(EventMask::all().to_string(), "*");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventMask {
    insert: bool,
    update: bool,
    delete: bool,
}

impl EventMask {
    pub const fn all() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            insert: false,
            update: false,
            delete: false,
        }
    }

    pub fn only(ops: &[ChangeOperation]) -> Self {
        ops.iter().fold(Self::none(), |mask, op| mask.with(*op))
    }

    pub fn with(mut self, op: ChangeOperation) -> Self {
        match op {
            ChangeOperation::Insert => self.insert = true,
            ChangeOperation::Update => self.update = true,
            ChangeOperation::Delete => self.delete = true,
        }
        self
    }

    pub fn contains(&self, op: ChangeOperation) -> bool {
        match op {
            ChangeOperation::Insert => self.insert,
            ChangeOperation::Update => self.update,
            ChangeOperation::Delete => self.delete,
        }
    }

    pub fn is_all(&self) -> bool {
        self.insert && self.update && self.delete
    }

    pub fn is_empty(&self) -> bool {
        !(self.insert || self.update || self.delete)
    }

    pub fn operations(&self) -> Vec<ChangeOperation> {
        ChangeOperation::ALL
            .into_iter()
            .filter(|op| self.contains(*op))
            .collect()
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for EventMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("*");
        }
        let ops: Vec<&str> = self.operations().iter().map(|op| op.as_str()).collect();
        f.write_str(&ops.join(","))
    }
}

impl FromStr for EventMask {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::all());
        }
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .try_fold(Self::none(), |mask, part| Ok(mask.with(part.parse()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_parse_and_display() {
        assert_eq!("*".parse::<EventMask>().unwrap(), EventMask::all());
        let mask: EventMask = "insert, UPDATE".parse().unwrap();
        assert!(mask.contains(ChangeOperation::Insert));
        assert!(mask.contains(ChangeOperation::Update));
        assert!(!mask.contains(ChangeOperation::Delete));
        assert_eq!(mask.to_string(), "INSERT,UPDATE");
    }

    #[test]
    fn test_unknown_operation_is_configuration_error() {
        let err = "INSERT,TRUNCATE".parse::<EventMask>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_mask() {
        assert!(EventMask::none().is_empty());
        assert!("".parse::<EventMask>().unwrap().is_empty());
        assert!(!EventMask::default().is_empty());
    }

    #[test]
    fn test_operation_serde_uppercase() {
        let json = serde_json::to_string(&ChangeOperation::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }
}
