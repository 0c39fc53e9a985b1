//! Trailing-edge debouncer for change events.
//!
//! Three states: `Idle` (nothing buffered), `PendingFlush` (an event is
//! buffered and a timer is armed) and `Closed` (final; buffered event and
//! timer are discarded). Every push re-arms the timer, so a burst collapses
//! into its last event once the feed has been quiet for one window.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::models::ChangeEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DebouncePhase {
    Idle,
    PendingFlush,
    Closed,
}

/// Result of [`Debouncer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
    /// Buffered; nothing was pending before.
    Scheduled,
    /// Buffered and replaced a previously pending event.
    Coalesced,
    /// The debouncer is closed; the event was discarded.
    Rejected,
}

struct DebounceState {
    phase: DebouncePhase,
    latest: Option<ChangeEvent>,
    timer: Option<JoinHandle<()>>,
    /// Identifies the armed timer so a late-firing stale timer cannot flush.
    seq: u64,
}

pub(crate) struct Debouncer {
    window: Duration,
    runtime: Handle,
    state: Mutex<DebounceState>,
}

impl Debouncer {
    pub(crate) fn new(window: Duration, runtime: Handle) -> Self {
        Self {
            window,
            runtime,
            state: Mutex::new(DebounceState {
                phase: DebouncePhase::Idle,
                latest: None,
                timer: None,
                seq: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn window(&self) -> Duration {
        self.window
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> DebouncePhase {
        self.lock().phase
    }

    /// Buffer `event` and (re)arm the timer. `on_ready` runs on the Tokio
    /// runtime after the window elapses, with the sequence number to pass
    /// back to [`take_ready`](Self::take_ready).
    pub(crate) fn push<F>(&self, event: ChangeEvent, on_ready: F) -> Push
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let mut state = self.lock();
        if state.phase == DebouncePhase::Closed {
            return Push::Rejected;
        }
        let replaced = state.latest.replace(event).is_some();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.seq += 1;
        let seq = state.seq;
        let window = self.window;
        state.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            on_ready(seq);
        }));
        state.phase = DebouncePhase::PendingFlush;
        if replaced {
            Push::Coalesced
        } else {
            Push::Scheduled
        }
    }

    /// Take the buffered event if `seq` still identifies the armed timer.
    pub(crate) fn take_ready(&self, seq: u64) -> Option<ChangeEvent> {
        let mut state = self.lock();
        if state.phase != DebouncePhase::PendingFlush || state.seq != seq {
            return None;
        }
        state.phase = DebouncePhase::Idle;
        state.timer = None;
        state.latest.take()
    }

    /// Move to `Closed`, cancelling any armed timer and discarding the buffer.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.phase = DebouncePhase::Closed;
        state.latest = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.close();
    }
}
