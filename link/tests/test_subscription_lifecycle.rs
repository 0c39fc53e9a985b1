//! Integration tests for SubscriptionManager lifecycle against the in-memory
//! transport: idempotent re-open, no delivery after close, error states,
//! channel isolation, debouncing and the subscribe timeout.

use civic_link::{
    ChangeOperation, EventMask, LinkError, LinkTimeouts, MemoryTransport, SubscriptionConfig,
    SubscriptionEvent, SubscriptionHandlers, SubscriptionManager, SubscriptionStatus,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

mod common;

use common::{comment_delete, comment_insert, issue_insert, manager, Recorder};

// ── channel bookkeeping ───────────────────────────────────────────────────────

#[test]
fn test_reopen_never_leaves_two_live_channels() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);

    for _ in 0..5 {
        manager
            .open(SubscriptionConfig::new("issues", "issues"), SubscriptionHandlers::new())
            .unwrap();
        let live = transport.open_count("issues") - transport.remove_count("issues");
        assert!(live <= 1, "{} live channels for 'issues'", live);
        assert_eq!(transport.live_count("issues"), 1);
    }
    assert_eq!(transport.open_count("issues"), 5);
    assert_eq!(manager.len(), 1);
}

#[test]
fn test_reopen_tears_down_old_channel_before_opening_new() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let old = Recorder::new();
    let new = Recorder::new();

    manager
        .open(SubscriptionConfig::new("issues", "issues"), old.handlers())
        .unwrap();
    let first = transport.channel("issues").unwrap();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), new.handlers())
        .unwrap();
    let second = transport.channel("issues").unwrap();

    assert_eq!(transport.channels("issues").len(), 1);
    assert!(first.is_removed());
    assert!(!second.is_removed());
    assert!(first.serial() < second.serial());

    // An event still in flight on the old channel reaches nobody.
    first.emit(issue_insert(1));
    transport.push("issues", issue_insert(2));

    assert_eq!(old.change_count(), 0);
    assert_eq!(new.ids(), vec![2]);
    assert_eq!(
        old.statuses(),
        vec![
            SubscriptionStatus::Pending,
            SubscriptionStatus::Connected,
            SubscriptionStatus::Closed
        ]
    );
}

// ── no delivery after close ───────────────────────────────────────────────────

#[test]
fn test_close_stops_delivery_of_in_flight_events() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    let handle = manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();

    transport.push("issues", issue_insert(1));
    assert_eq!(rec.change_count(), 1);
    let removed = transport.channel("issues").unwrap();

    assert!(manager.close("issues"));
    assert!(!handle.is_active());
    assert_eq!(handle.status(), SubscriptionStatus::Closed);
    assert!(removed.is_removed());

    removed.emit(issue_insert(2));
    removed.report_status(civic_link::ChannelStatus::Error, Some("late".into()));
    transport.push("issues", issue_insert(3));

    assert_eq!(rec.change_count(), 1);
    assert!(rec.errors().is_empty());
    assert_eq!(rec.statuses().last(), Some(&SubscriptionStatus::Closed));
}

#[test]
fn test_no_handler_runs_after_close_returns_across_threads() {
    for _ in 0..25 {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        let closed = Arc::new(AtomicBool::new(false));
        let late_calls = Arc::new(AtomicUsize::new(0));
        let (seen_closed, late) = (closed.clone(), late_calls.clone());
        manager
            .open(
                SubscriptionConfig::new("issues", "issues"),
                SubscriptionHandlers::new().on_change(move |_| {
                    if seen_closed.load(Ordering::SeqCst) {
                        late.fetch_add(1, Ordering::SeqCst);
                    }
                }),
            )
            .unwrap();

        let channel = transport.channel("issues").unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let pusher = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    channel.emit(issue_insert(1));
                }
            })
        };

        thread::sleep(Duration::from_millis(2));
        manager.close("issues");
        closed.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        stop.store(true, Ordering::SeqCst);
        pusher.join().unwrap();

        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn test_close_all_silences_every_subscription() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let issues = Recorder::new();
    let comments = Recorder::new();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), issues.handlers())
        .unwrap();
    manager
        .open(SubscriptionConfig::new("comments-42", "comments"), comments.handlers())
        .unwrap();

    let channels: Vec<_> = transport
        .channels("issues")
        .into_iter()
        .chain(transport.channels("comments-42"))
        .collect();
    assert_eq!(channels.len(), 2);

    assert_eq!(manager.close_all(), 2);
    assert_eq!(transport.total_live(), 0);
    for channel in channels {
        assert!(channel.is_removed());
        channel.emit(issue_insert(1));
        channel.emit(comment_insert(1, 42));
    }

    assert_eq!(issues.change_count(), 0);
    assert_eq!(comments.change_count(), 0);
    assert_eq!(
        manager
            .open(SubscriptionConfig::new("issues", "issues"), SubscriptionHandlers::new())
            .unwrap_err(),
        LinkError::ManagerClosed
    );
}

#[test]
fn test_closing_a_never_connected_channel_is_quiet() {
    let transport = MemoryTransport::manual();
    let manager = manager(&transport);
    let rec = Recorder::new();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();
    assert_eq!(manager.status("issues"), Some(SubscriptionStatus::Pending));

    assert!(manager.close("issues"));
    assert!(rec.errors().is_empty());
    assert_eq!(
        rec.statuses(),
        vec![SubscriptionStatus::Pending, SubscriptionStatus::Closed]
    );
    assert_eq!(manager.status("issues"), None);
}

// ── channel isolation ─────────────────────────────────────────────────────────

#[test]
fn test_two_feeds_receive_only_their_own_events() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let issues = Recorder::new();
    let comments = Recorder::new();

    manager
        .open(SubscriptionConfig::new("issues", "issues"), issues.handlers())
        .unwrap();
    manager
        .open(
            SubscriptionConfig::new("comments-42", "comments").with_filter("issue_id=eq.42"),
            comments.handlers(),
        )
        .unwrap();

    transport.push("issues", issue_insert(7));
    transport.push("comments-42", comment_delete(3, 42));

    let issue_events = issues.changes();
    assert_eq!(issue_events.len(), 1);
    assert_eq!(issue_events[0].operation, ChangeOperation::Insert);
    assert_eq!(issue_events[0].table, "issues");

    let comment_events = comments.changes();
    assert_eq!(comment_events.len(), 1);
    assert_eq!(comment_events[0].operation, ChangeOperation::Delete);
    assert_eq!(comment_events[0].table, "comments");
}

#[test]
fn test_event_mask_and_row_filter_limit_delivery() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    let handle = manager
        .open(
            SubscriptionConfig::new("comments-42", "comments")
                .with_events(EventMask::only(&[ChangeOperation::Insert]))
                .with_filter("issue_id=eq.42"),
            rec.handlers(),
        )
        .unwrap();

    transport.push("comments-42", comment_insert(1, 42));
    transport.push("comments-42", comment_insert(2, 7));
    transport.push("comments-42", comment_delete(1, 42));

    assert_eq!(rec.ids(), vec![1]);
    assert_eq!(handle.info().events_delivered, 1);
}

#[test]
fn test_typed_slots_route_by_operation() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let inserts = Arc::new(AtomicUsize::new(0));
    let deletes = Arc::new(AtomicUsize::new(0));
    let (i, d) = (inserts.clone(), deletes.clone());

    manager
        .open(
            SubscriptionConfig::new("comments-42", "comments"),
            SubscriptionHandlers::new()
                .on_insert(move |_| {
                    i.fetch_add(1, Ordering::SeqCst);
                })
                .on_delete(move |_| {
                    d.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .unwrap();

    transport.push("comments-42", comment_insert(1, 42));
    transport.push("comments-42", comment_insert(2, 42));
    transport.push("comments-42", comment_delete(1, 42));

    assert_eq!(inserts.load(Ordering::SeqCst), 2);
    assert_eq!(deletes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_events_arrive_in_transport_order() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();
    for id in [5, 3, 9, 1] {
        transport.push("issues", issue_insert(id));
    }
    assert_eq!(rec.ids(), vec![5, 3, 9, 1]);
}

// ── failures ──────────────────────────────────────────────────────────────────

#[test]
fn test_transport_error_leaves_queryable_error_state() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    let handle = manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();

    transport.fail("issues", "socket reset");

    assert_eq!(handle.status(), SubscriptionStatus::Error);
    assert_eq!(manager.status("issues"), Some(SubscriptionStatus::Error));
    assert!(!manager.is_active("issues"));
    let errors = rec.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_retryable());

    // Consumer-driven retry: re-open replaces the failed channel.
    let retry = manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();
    assert!(retry.is_active());
    assert_eq!(transport.live_count("issues"), 1);
}

#[test]
fn test_remote_drop_is_a_transport_error() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();

    transport.drop_remote("issues");
    assert_eq!(manager.status("issues"), Some(SubscriptionStatus::Error));
    assert!(matches!(rec.errors()[0], LinkError::TransportError(_)));
}

#[test]
fn test_panicking_handler_does_not_stop_delivery() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let (sink, err_sink) = (delivered.clone(), errors.clone());

    manager
        .open(
            SubscriptionConfig::new("issues", "issues"),
            SubscriptionHandlers::new()
                .on_change(move |event| {
                    let id = event.key("id").and_then(|v| v.as_i64()).unwrap_or_default();
                    if id == 1 {
                        panic!("render failed for issue {}", id);
                    }
                    sink.lock().unwrap().push(id);
                })
                .on_error(move |err| err_sink.lock().unwrap().push(err)),
        )
        .unwrap();
    let bystander = Recorder::new();
    manager
        .open(SubscriptionConfig::new("votes", "votes"), bystander.handlers())
        .unwrap();

    transport.push("issues", issue_insert(1));
    transport.push("issues", issue_insert(2));

    assert_eq!(*delivered.lock().unwrap(), vec![2]);
    let errors = errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], LinkError::HandlerError(msg) if msg.contains("render failed")));
    assert!(manager.is_active("issues"));
    assert!(manager.is_active("votes"));
    assert!(bystander.errors().is_empty());
}

#[test]
fn test_invalid_config_is_rejected_synchronously() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let err = manager
        .open(
            SubscriptionConfig::new("issues", "issues").with_events(EventMask::none()),
            SubscriptionHandlers::new(),
        )
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(transport.open_count("issues"), 0);
}

// ── handles ───────────────────────────────────────────────────────────────────

#[test]
fn test_dropping_handle_keeps_subscription_open() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    drop(
        manager
            .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
            .unwrap(),
    );
    transport.push("issues", issue_insert(1));
    assert_eq!(rec.change_count(), 1);
}

#[test]
fn test_handle_outliving_manager_reports_closed() {
    let transport = MemoryTransport::new();
    let handle = {
        let manager = manager(&transport);
        manager
            .open(SubscriptionConfig::new("issues", "issues"), SubscriptionHandlers::new())
            .unwrap()
    };
    assert!(!handle.is_active());
    assert_eq!(handle.status(), SubscriptionStatus::Closed);
    handle.close();
    assert_eq!(transport.remove_count("issues"), 1);
}

// ── async consumers and timers ────────────────────────────────────────────────

#[tokio::test]
async fn test_channel_handlers_feed_an_async_receiver() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let (handlers, mut rx) = SubscriptionHandlers::channel(16);
    manager
        .open(SubscriptionConfig::new("issues", "issues"), handlers)
        .unwrap();

    transport.push("issues", issue_insert(4));
    manager.close("issues");

    assert_eq!(
        rx.recv().await,
        Some(SubscriptionEvent::Status(SubscriptionStatus::Pending))
    );
    assert_eq!(
        rx.recv().await,
        Some(SubscriptionEvent::Status(SubscriptionStatus::Connected))
    );
    assert_eq!(rx.recv().await, Some(SubscriptionEvent::Change(issue_insert(4))));
    assert_eq!(
        rx.recv().await,
        Some(SubscriptionEvent::Status(SubscriptionStatus::Closed))
    );
}

#[tokio::test(start_paused = true)]
async fn test_debounced_burst_delivers_last_event_only() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    let handle = manager
        .open(
            SubscriptionConfig::new("issues", "issues").with_debounce(),
            rec.handlers(),
        )
        .unwrap();

    for id in 1..=4 {
        transport.push("issues", issue_insert(id));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(rec.change_count(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rec.ids(), vec![4]);

    let info = handle.info();
    assert!(info.debounced);
    assert_eq!(info.events_delivered, 1);
    assert_eq!(info.events_dropped, 3);
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_debounce() {
    let transport = MemoryTransport::new();
    let manager = manager(&transport);
    let rec = Recorder::new();
    manager
        .open(
            SubscriptionConfig::new("issues", "issues")
                .with_debounce_window(Duration::from_millis(100)),
            rec.handlers(),
        )
        .unwrap();

    transport.push("issues", issue_insert(1));
    manager.close("issues");
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(rec.change_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_timeout_reports_error() {
    let transport = MemoryTransport::manual();
    let manager = SubscriptionManager::builder()
        .transport(Arc::new(transport.clone()))
        .timeouts(LinkTimeouts::for_testing(1_000))
        .build()
        .unwrap();
    let rec = Recorder::new();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(manager.status("issues"), Some(SubscriptionStatus::Error));
    let errors = rec.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("timed out"));

    // A late acknowledgment recovers the channel.
    transport.connect("issues");
    assert_eq!(manager.status("issues"), Some(SubscriptionStatus::Connected));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_subscribe_timeout() {
    let transport = MemoryTransport::manual();
    let manager = SubscriptionManager::builder()
        .transport(Arc::new(transport.clone()))
        .timeouts(LinkTimeouts::for_testing(1_000))
        .build()
        .unwrap();
    let rec = Recorder::new();
    manager
        .open(SubscriptionConfig::new("issues", "issues"), rec.handlers())
        .unwrap();
    manager.close("issues");

    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(rec.errors().is_empty());
}
