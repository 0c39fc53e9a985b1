//! Shared helpers for civic-link integration tests.
#![allow(dead_code)]

use civic_link::{
    ChangeEvent, LinkError, MemoryTransport, Row, SubscriptionHandlers, SubscriptionManager,
    SubscriptionStatus,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Records every callback a subscription receives.
#[derive(Clone, Default)]
pub struct Recorder {
    pub changes: Arc<Mutex<Vec<ChangeEvent>>>,
    pub statuses: Arc<Mutex<Vec<SubscriptionStatus>>>,
    pub errors: Arc<Mutex<Vec<LinkError>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers that append into this recorder.
    pub fn handlers(&self) -> SubscriptionHandlers {
        let (c, s, e) = (
            self.changes.clone(),
            self.statuses.clone(),
            self.errors.clone(),
        );
        SubscriptionHandlers::new()
            .on_change(move |ev| c.lock().unwrap().push(ev))
            .on_status(move |st| s.lock().unwrap().push(st))
            .on_error(move |err| e.lock().unwrap().push(err))
    }

    pub fn change_count(&self) -> usize {
        self.changes.lock().unwrap().len()
    }

    pub fn changes(&self) -> Vec<ChangeEvent> {
        self.changes.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<SubscriptionStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<LinkError> {
        self.errors.lock().unwrap().clone()
    }

    /// `id` column of every received change, in delivery order.
    pub fn ids(&self) -> Vec<i64> {
        self.changes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|ev| ev.key("id").and_then(|v| v.as_i64()))
            .collect()
    }
}

pub fn manager(transport: &MemoryTransport) -> SubscriptionManager {
    SubscriptionManager::new(Arc::new(transport.clone()))
}

pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn issue_insert(id: i64) -> ChangeEvent {
    ChangeEvent::insert("issues", row(&[("id", json!(id)), ("title", json!("pothole"))]), 0)
}

pub fn comment_insert(id: i64, issue_id: i64) -> ChangeEvent {
    ChangeEvent::insert(
        "comments",
        row(&[("id", json!(id)), ("issue_id", json!(issue_id))]),
        0,
    )
}

pub fn comment_delete(id: i64, issue_id: i64) -> ChangeEvent {
    ChangeEvent::delete(
        "comments",
        row(&[("id", json!(id)), ("issue_id", json!(issue_id))]),
        0,
    )
}
