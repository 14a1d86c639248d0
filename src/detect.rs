//! Bounded wait for an external change signal.
//!
//! In-process feeds signal "something changed" through a [`ChangePulse`];
//! the browser feed substitutes an injected MutationObserver with the same
//! contract (see `feed::chromium`). Either way a wait resolves exactly once,
//! `true` on the first observed change or `false` on timeout, and the
//! subscription never outlives the call.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// A subscribe/timeout race over an in-process change signal.
///
/// Signals raised while nobody is waiting are dropped, matching the
/// observe-after-advance lifecycle of a DOM MutationObserver; the engine's
/// nudge path recovers from that gap.
#[derive(Clone, Debug, Default)]
pub struct ChangePulse {
    notify: Arc<Notify>,
}

impl ChangePulse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce that the observed source changed. Wakes every current
    /// waiter; a no-op when nobody is waiting.
    pub fn signal(&self) {
        self.notify.notify_waiters();
    }

    /// Wait for a signal, up to `timeout`. The subscription is dropped on
    /// both the signal path and the timeout path.
    pub async fn await_change(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.notify.notified())
            .await
            .is_ok()
    }
}
