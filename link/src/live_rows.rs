//! Local row list kept in sync with a change feed.

use serde_json::Value as JsonValue;

use crate::models::{ChangeEvent, ChangeOperation, Row};

/// Rows keyed by one column, updated from [`ChangeEvent`]s.
///
/// Inserts are prepended (newest first), updates replace the row with the
/// same key or are prepended if it is unknown, deletes remove by the key in
/// `old_row`.
///
/// # Example
///
/// ```rust
/// use civic_link::{ChangeEvent, LiveRows, Row};
/// use serde_json::json;
///
/// let mut issues = LiveRows::new("id");
/// let row: Row = [("id".to_string(), json!(7))].into_iter().collect();
/// issues.apply(&ChangeEvent::insert("issues", row.clone(), 0));
/// assert_eq!(issues.len(), 1);
///
/// issues.apply(&ChangeEvent::delete("issues", row, 0));
/// assert!(issues.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveRows {
    key: String,
    rows: Vec<Row>,
}

impl LiveRows {
    pub fn new(key: impl Into<String>) -> Self {
        Self::from_rows(key, Vec::new())
    }

    /// Start from an initial fetch.
    pub fn from_rows(key: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            key: key.into(),
            rows,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &JsonValue) -> Option<&Row> {
        self.position(key).map(|i| &self.rows[i])
    }

    fn position(&self, key: &JsonValue) -> Option<usize> {
        self.rows.iter().position(|row| row.get(&self.key) == Some(key))
    }

    /// Fold one event into the list. Returns `true` if the list changed.
    ///
    /// Events whose row lacks the key column are ignored.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                let Some(row) = event.new_row.as_ref() else {
                    return false;
                };
                let Some(key) = row.get(&self.key) else {
                    log::debug!(
                        "[civic-link] {} on '{}' has no '{}' column; ignored",
                        event.operation,
                        event.table,
                        self.key
                    );
                    return false;
                };
                match self.position(key) {
                    Some(i) => self.rows[i] = row.clone(),
                    None => self.rows.insert(0, row.clone()),
                }
                true
            },
            ChangeOperation::Delete => {
                let key = event.old_row.as_ref().and_then(|row| row.get(&self.key));
                match key.and_then(|k| self.position(k)) {
                    Some(i) => {
                        self.rows.remove(i);
                        true
                    },
                    None => false,
                }
            },
        }
    }
}
