//! Message coalescing.
//!
//! Coalescing merges a newly produced notification into an equivalent one
//! that is still pending in a mailbox, reducing queue volume without losing
//! information. It is purely an optimization: correctness never depends on
//! a coalescer being registered.

use crate::message::NotificationMessage;

/// Fuses notifications of one kind.
///
/// Coalescers are registered on the `NotificationRegistry` and handed to
/// every mailbox it creates. On put, each pending entry (newest first) is
/// offered to each coalescer; the first successful fusion keeps the pending
/// entry in its queue position and discards the incoming copy.
pub trait Coalescer: Send + Sync {
    /// Attempt to fuse `incoming` into `pending`.
    ///
    /// Returns `true` when the fusion happened, e.g. by unioning affected-id
    /// sets in the pending payload. Returns `false` for unrelated messages
    /// (different kind, incompatible parameters); the incoming message is
    /// then queued as its own entry.
    fn coalesce(&self, pending: &mut NotificationMessage, incoming: &NotificationMessage) -> bool;
}
