//! Transaction-scoped notification collection.
//!
//! While a transaction is open, notifications targeting the node that is
//! executing the request are buffered here instead of being queued, so the
//! response of that very request can carry them back directly. The commit
//! pipeline drains the collector exactly once; everything it holds becomes
//! externally observable only at commit.

use tokio::sync::Mutex;
use tracing::debug;

use crate::message::NotificationMessage;

/// Per-transaction buffer for response piggybacking.
///
/// Created at transaction start, discarded at commit or rollback. Starts
/// active; the first `values` call drains the buffer and deactivates the
/// collector for good, after which `add_all` refuses further messages and
/// callers fall back to mailbox delivery.
#[derive(Debug, Default)]
pub struct TransactionNotificationCollector {
    state: Mutex<CollectorState>,
}

#[derive(Debug)]
struct CollectorState {
    active: bool,
    values: Vec<NotificationMessage>,
}

impl Default for CollectorState {
    fn default() -> Self {
        Self {
            active: true,
            values: Vec::new(),
        }
    }
}

impl TransactionNotificationCollector {
    /// Create an active, empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append messages while the collector is active.
    ///
    /// Returns whether the messages were accepted. `false` means the
    /// collector was already drained; the caller should deliver through the
    /// mailbox instead.
    pub async fn add_all(&self, mut messages: Vec<NotificationMessage>) -> bool {
        let mut state = self.state.lock().await;
        if !state.active {
            debug!(
                count = messages.len(),
                "Collector already consumed, refusing messages"
            );
            return false;
        }
        state.values.append(&mut messages);
        true
    }

    /// Whether the collector still accepts messages.
    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    /// Drain the collected messages and deactivate.
    ///
    /// Consume-and-clear: safe to call more than once, later calls yield
    /// only what arrived after the previous drain point and never
    /// reintroduce already-delivered messages.
    pub async fn values(&self) -> Vec<NotificationMessage> {
        let mut state = self.state.lock().await;
        state.active = false;
        std::mem::take(&mut state.values)
    }
}
