//! Server-side row predicates in `column=op.value` form.
//!
//! The same string is handed to the transport untouched; parsing it here lets
//! `open` reject malformed filters early and lets in-process transports
//! evaluate it.

use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::change_event::Row;
use crate::error::{LinkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl FilterOp {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::In => "in",
        }
    }
}

impl FromStr for FilterOp {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "in" => Ok(Self::In),
            other => Err(LinkError::ConfigurationError(format!(
                "Unsupported filter operator '{}'",
                other
            ))),
        }
    }
}

/// Parsed `column=op.value` predicate.
///
/// # Example
///
/// ```rust
/// use civic_link::RowFilter;
/// use serde_json::json;
///
/// let filter = RowFilter::parse("issue_id=eq.42").unwrap();
/// let row = [("issue_id".to_string(), json!(42))].into_iter().collect();
/// assert!(filter.matches(&row));
///
/// let filter = RowFilter::parse("status=in.(open,in_progress)").unwrap();
/// let row = [("status".to_string(), json!("resolved"))].into_iter().collect();
/// assert!(!filter.matches(&row));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RowFilter {
    column: String,
    op: FilterOp,
    values: Vec<JsonValue>,
}

impl RowFilter {
    pub fn parse(expr: &str) -> Result<Self> {
        let malformed = || {
            LinkError::ConfigurationError(format!(
                "Malformed filter '{}': expected column=op.value",
                expr
            ))
        };

        let (column, rest) = expr.split_once('=').ok_or_else(malformed)?;
        let (op, raw) = rest.split_once('.').ok_or_else(malformed)?;
        let column = column.trim();
        if column.is_empty() || raw.is_empty() {
            return Err(malformed());
        }
        let op: FilterOp = op.trim().parse()?;

        let values = if op == FilterOp::In {
            let inner = raw
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or_else(malformed)?;
            inner
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(parse_literal)
                .collect::<Vec<_>>()
        } else {
            vec![parse_literal(raw)]
        };
        if values.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            column: column.to_string(),
            op,
            values,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> FilterOp {
        self.op
    }

    /// Evaluate against a row. Missing or null columns never match.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = match row.get(&self.column) {
            Some(JsonValue::Null) | None => return false,
            Some(v) => v,
        };
        let first = &self.values[0];
        match self.op {
            FilterOp::Eq => literal_eq(actual, first),
            FilterOp::Neq => !literal_eq(actual, first),
            FilterOp::In => self.values.iter().any(|v| literal_eq(actual, v)),
            FilterOp::Lt => compare(actual, first) == Some(Ordering::Less),
            FilterOp::Lte => matches!(compare(actual, first), Some(Ordering::Less | Ordering::Equal)),
            FilterOp::Gt => compare(actual, first) == Some(Ordering::Greater),
            FilterOp::Gte => {
                matches!(compare(actual, first), Some(Ordering::Greater | Ordering::Equal))
            },
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let render = |v: &JsonValue| match v {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        };
        if self.op == FilterOp::In {
            let list: Vec<String> = self.values.iter().map(render).collect();
            write!(f, "{}=in.({})", self.column, list.join(","))
        } else {
            write!(f, "{}={}.{}", self.column, self.op.as_str(), render(&self.values[0]))
        }
    }
}

impl FromStr for RowFilter {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_literal(raw: &str) -> JsonValue {
    let raw = raw.trim();
    if let Some(quoted) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return JsonValue::String(quoted.to_string());
    }
    match serde_json::from_str::<JsonValue>(raw) {
        Ok(v @ (JsonValue::Number(_) | JsonValue::Bool(_) | JsonValue::Null)) => v,
        _ => JsonValue::String(raw.to_string()),
    }
}

fn literal_eq(actual: &JsonValue, expected: &JsonValue) -> bool {
    match (actual, expected) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64() == b.as_f64(),
        // ids often arrive as strings on one side and numbers on the other
        (JsonValue::String(a), JsonValue::Number(b)) => a == &b.to_string(),
        (JsonValue::Number(a), JsonValue::String(b)) => &a.to_string() == b,
        (a, b) => a == b,
    }
}

fn compare(actual: &JsonValue, expected: &JsonValue) -> Option<Ordering> {
    match (actual, expected) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, JsonValue)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_eq_matches_number_and_string_ids() {
        let filter = RowFilter::parse("issue_id=eq.42").unwrap();
        assert!(filter.matches(&row(&[("issue_id", json!(42))])));
        assert!(filter.matches(&row(&[("issue_id", json!("42"))])));
        assert!(!filter.matches(&row(&[("issue_id", json!(43))])));
        assert!(!filter.matches(&row(&[("other", json!(42))])));
    }

    #[test]
    fn test_range_operators() {
        let gte = RowFilter::parse("votes=gte.10").unwrap();
        assert!(gte.matches(&row(&[("votes", json!(10))])));
        assert!(!gte.matches(&row(&[("votes", json!(9))])));

        let lt = RowFilter::parse("created_at=lt.2024-06-01").unwrap();
        assert!(lt.matches(&row(&[("created_at", json!("2024-05-31"))])));
        assert!(!lt.matches(&row(&[("created_at", json!(5))])));
    }

    #[test]
    fn test_in_list() {
        let filter = RowFilter::parse("status=in.(open, in_progress)").unwrap();
        assert!(filter.matches(&row(&[("status", json!("in_progress"))])));
        assert!(!filter.matches(&row(&[("status", json!("closed"))])));
        assert_eq!(filter.to_string(), "status=in.(open,in_progress)");
    }

    #[test]
    fn test_null_never_matches() {
        let filter = RowFilter::parse("assignee=neq.alice").unwrap();
        assert!(!filter.matches(&row(&[("assignee", JsonValue::Null)])));
        assert!(filter.matches(&row(&[("assignee", json!("bob"))])));
    }

    #[test]
    fn test_malformed_filters_are_rejected() {
        for expr in ["issue_id", "issue_id=42", "=eq.1", "id=like.%a%", "id=in.1,2", "id=in.()"] {
            let err = RowFilter::parse(expr).unwrap_err();
            assert!(err.is_configuration(), "expected configuration error for {expr}");
        }
    }
}
