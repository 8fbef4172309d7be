//! Notification messages and addressing.
//!
//! A `NotificationMessage` is the immutable, addressed unit of delivery.
//! Payloads are opaque JSON; the embedding application decides structure
//! and wire encoding.

use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

/// Delivery target of a notification.
///
/// Routing resolves an address to the set of node mailboxes that should
/// receive a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// Every node that currently has at least one registered session.
    AllNodes,
    /// The single node the session is registered on, if any.
    Session(String),
    /// Every node holding at least one session of the user.
    User(String),
}

/// Options applied when putting a notification into the registry.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Lifetime override; falls back to the configured default.
    pub expires_in: Option<Duration>,
    /// Correlation id override; a v4 UUID is minted when absent.
    pub correlation_id: Option<String>,
}

impl PutOptions {
    /// Create empty options (all defaults).
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the notification lifetime.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Override the correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// An addressed, immutable notification.
///
/// Every mailbox copy produced by a single put call carries the same
/// correlation id. Equality is identity; merging two messages is the
/// `Coalescer`'s explicit job, never `==`.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    address: Address,
    payload: Value,
    correlation_id: String,
    created_at: Instant,
    expires_in: Duration,
}

impl NotificationMessage {
    /// Create a message with a fresh v4 correlation id.
    pub fn new(address: Address, payload: Value, expires_in: Duration) -> Self {
        Self {
            address,
            payload,
            correlation_id: Uuid::new_v4().to_string(),
            created_at: Instant::now(),
            expires_in,
        }
    }

    /// Replace the generated correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// The delivery target.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The opaque payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Mutable payload access for coalescers.
    ///
    /// Only meaningful while the message is still pending in a mailbox.
    pub fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    /// The correlation id shared by all copies of one put call.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// When the message was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Whether the message has outlived its configured lifetime at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.expires_in
    }
}
