use std::fmt;
use std::sync::{Arc, Weak};

use super::dispatch::Dispatcher;
use super::manager::ManagerInner;
use crate::models::{SubscriptionInfo, SubscriptionStatus};

/// Handle to one opened subscription.
///
/// Dropping the handle does not close the subscription; the manager owns it.
/// Closing through a handle only affects the generation it was returned for,
/// so a handle from before a re-open cannot close its replacement.
#[derive(Clone)]
pub struct SubscriptionHandle {
    dispatcher: Arc<Dispatcher>,
    manager: Weak<ManagerInner>,
}

impl SubscriptionHandle {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>, manager: Weak<ManagerInner>) -> Self {
        Self {
            dispatcher,
            manager,
        }
    }

    pub fn channel_id(&self) -> &str {
        self.dispatcher.channel_id()
    }

    /// Monotonic open counter; a re-open of the same id gets a larger value.
    pub fn generation(&self) -> u64 {
        self.dispatcher.generation()
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.dispatcher.status()
    }

    /// `true` while pending or connected and the manager is alive.
    pub fn is_active(&self) -> bool {
        self.dispatcher.is_active()
    }

    pub fn info(&self) -> SubscriptionInfo {
        self.dispatcher.info()
    }

    /// Close this subscription. No-op if it was already closed or replaced.
    pub fn close(&self) {
        match self.manager.upgrade() {
            Some(manager) => manager.close_generation(self.channel_id(), self.generation()),
            // Manager already dropped; its teardown closed everything.
            None => {
                self.dispatcher.shutdown();
            },
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel_id", &self.dispatcher.channel_id())
            .field("generation", &self.dispatcher.generation())
            .field("status", &self.dispatcher.status())
            .finish()
    }
}
