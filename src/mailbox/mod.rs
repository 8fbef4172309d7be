//! Per-node notification mailboxes.
//!
//! Every registered cluster node owns one bounded FIFO mailbox. Producers
//! never block and never fail: past capacity the oldest pending entry is
//! dropped. The (nominally single) long-poll consumer drains with a
//! deadline, suspending on a wakeup primitive rather than polling.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::coalesce::Coalescer;
use crate::message::NotificationMessage;

/// Bounded FIFO queue of pending notifications for one node.
///
/// `len() <= capacity` at all times. Insertion order (after coalescing) is
/// the order `take` observes.
pub struct NodeMailbox {
    node_id: String,
    capacity: usize,
    coalescers: Vec<Arc<dyn Coalescer>>,
    queue: Mutex<VecDeque<NotificationMessage>>,
    notify: Notify,
}

impl NodeMailbox {
    /// Create an empty mailbox for `node_id`.
    pub fn new(
        node_id: impl Into<String>,
        capacity: usize,
        coalescers: Vec<Arc<dyn Coalescer>>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            capacity,
            coalescers,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// The node this mailbox belongs to.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Append a message, coalescing into a pending entry when possible.
    ///
    /// Never blocks on consumers and never errors: when the queue is full
    /// the oldest entry is evicted to make room. A successful coalesce
    /// mutates the matched pending entry in place, keeping its queue
    /// position, and discards the incoming copy.
    pub async fn put(&self, message: NotificationMessage) {
        {
            let mut queue = self.queue.lock().await;
            if self.try_coalesce(&mut queue, &message) {
                trace!(
                    node_id = %self.node_id,
                    correlation_id = %message.correlation_id(),
                    "Coalesced notification into pending entry"
                );
            } else {
                queue.push_back(message);
                if queue.len() > self.capacity {
                    if let Some(dropped) = queue.pop_front() {
                        debug!(
                            node_id = %self.node_id,
                            correlation_id = %dropped.correlation_id(),
                            "Mailbox full, dropped oldest notification"
                        );
                    }
                }
            }
        }
        self.notify.notify_waiters();
    }

    /// Take up to `max_count` messages, waiting at most `timeout`.
    ///
    /// Returns as soon as at least one message is available, draining
    /// whatever is pending up to `max_count` in insertion order. Returns
    /// empty when the deadline passes first. Spurious wakeups re-wait
    /// against the same deadline. Dropping the returned future (consumer
    /// cancelled, client disconnected) simply abandons the wait; it is not
    /// an error and removes nothing from the queue.
    pub async fn take(&self, max_count: usize, timeout: Duration) -> Vec<NotificationMessage> {
        if max_count == 0 {
            return Vec::new();
        }
        let deadline = Instant::now() + timeout;
        loop {
            // Arm the waiter before checking, so a put between the check
            // and the await is never lost.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queue = self.queue.lock().await;
                if !queue.is_empty() {
                    let count = max_count.min(queue.len());
                    let taken: Vec<NotificationMessage> = queue.drain(..count).collect();
                    trace!(
                        node_id = %self.node_id,
                        count = taken.len(),
                        remaining = queue.len(),
                        "Drained notifications"
                    );
                    return taken;
                }
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    /// Drop every pending message that has expired at `now`.
    ///
    /// Returns how many entries were removed.
    pub async fn remove_expired(&self, now: std::time::Instant) -> usize {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|message| !message.is_expired(now));
        before - queue.len()
    }

    /// Number of pending messages.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Whether no messages are pending.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    fn try_coalesce(
        &self,
        queue: &mut VecDeque<NotificationMessage>,
        incoming: &NotificationMessage,
    ) -> bool {
        // Newest first: fuse with the most recently inserted matching entry.
        for pending in queue.iter_mut().rev() {
            for coalescer in &self.coalescers {
                if coalescer.coalesce(pending, incoming) {
                    return true;
                }
            }
        }
        false
    }
}
