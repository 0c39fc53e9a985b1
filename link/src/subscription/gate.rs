//! Mutual exclusion between handler dispatch and close.
//!
//! Every handler invocation runs inside [`DeliveryGate::enter`]. `close`
//! marks the gate closed and then waits until no other thread is inside it,
//! so once `close` returns no handler of that subscription is running or can
//! start. A handler that closes its own subscription does not wait for itself.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct GateState {
    closed: bool,
    /// One entry per delivery in progress (a thread may nest).
    delivering: Vec<ThreadId>,
    /// Threads currently blocked in `close`.
    closing: Vec<ThreadId>,
}

impl GateState {
    /// Deliveries `me` has to wait for. Threads that are themselves closing
    /// are skipped, otherwise two handlers closing concurrently would deadlock.
    fn must_wait(&self, me: ThreadId) -> bool {
        self.delivering
            .iter()
            .any(|t| *t != me && !self.closing.contains(t))
    }
}

#[derive(Default)]
pub(crate) struct DeliveryGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

pub(crate) struct GateGuard<'a> {
    gate: &'a DeliveryGate,
    thread: ThreadId,
}

impl DeliveryGate {
    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enter for one delivery, or `None` once the gate is closed.
    pub(crate) fn enter(&self) -> Option<GateGuard<'_>> {
        let thread = thread::current().id();
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        state.delivering.push(thread);
        Some(GateGuard { gate: self, thread })
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close the gate and wait for deliveries running on other threads.
    ///
    /// Returns `true` if this call closed the gate.
    pub(crate) fn close(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.lock();
        let closed_now = !state.closed;
        state.closed = true;
        if !state.must_wait(me) {
            return closed_now;
        }
        state.closing.push(me);
        self.idle.notify_all();
        while state.must_wait(me) {
            state = self
                .idle
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if let Some(pos) = state.closing.iter().position(|t| *t == me) {
            state.closing.swap_remove(pos);
        }
        self.idle.notify_all();
        closed_now
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        if let Some(pos) = state.delivering.iter().position(|t| *t == self.thread) {
            state.delivering.swap_remove(pos);
        }
        drop(state);
        self.gate.idle.notify_all();
    }
}
