use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::change_operation::ChangeOperation;
use crate::error::{LinkError, Result};

/// Opaque key/value record as returned by the remote data store.
pub type Row = HashMap<String, JsonValue>;

/// A single notification delivered by a change feed.
///
/// `Insert` and `Update` carry `new_row`; `Delete` carries at least the
/// identifying key in `old_row`. Use [`ChangeEvent::validate`] to check an
/// event built from untrusted transport data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_row: Option<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_row: Option<Row>,
    /// Millis since Unix epoch at which the transport received the event.
    pub received_at_ms: u64,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, new_row: Row, received_at_ms: u64) -> Self {
        Self {
            operation: ChangeOperation::Insert,
            table: table.into(),
            new_row: Some(new_row),
            old_row: None,
            received_at_ms,
        }
    }

    pub fn update(
        table: impl Into<String>,
        new_row: Row,
        old_row: Option<Row>,
        received_at_ms: u64,
    ) -> Self {
        Self {
            operation: ChangeOperation::Update,
            table: table.into(),
            new_row: Some(new_row),
            old_row,
            received_at_ms,
        }
    }

    pub fn delete(table: impl Into<String>, old_row: Row, received_at_ms: u64) -> Self {
        Self {
            operation: ChangeOperation::Delete,
            table: table.into(),
            new_row: None,
            old_row: Some(old_row),
            received_at_ms,
        }
    }

    /// Check the payload invariant for the event's operation.
    pub fn validate(&self) -> Result<()> {
        match self.operation {
            ChangeOperation::Insert | ChangeOperation::Update if self.new_row.is_none() => {
                Err(LinkError::TransportError(format!(
                    "{} event on '{}' is missing new_row",
                    self.operation, self.table
                )))
            },
            ChangeOperation::Delete if self.old_row.as_ref().map_or(true, |r| r.is_empty()) => {
                Err(LinkError::TransportError(format!(
                    "DELETE event on '{}' is missing the old row key",
                    self.table
                )))
            },
            _ => Ok(()),
        }
    }

    /// The row that best describes the event: `new_row` if present, otherwise `old_row`.
    pub fn row(&self) -> Option<&Row> {
        self.new_row.as_ref().or(self.old_row.as_ref())
    }

    /// Value of `column` in [`row`](Self::row).
    pub fn key(&self, column: &str) -> Option<&JsonValue> {
        self.row().and_then(|row| row.get(column))
    }
}
