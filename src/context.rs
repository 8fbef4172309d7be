//! Request-scoped delivery context.
//!
//! Carries the identity of the node executing the current request, the
//! transaction's collector when one is open, and whether an outgoing
//! response exists to piggyback on. Passed explicitly to the transactional
//! put variants so the piggyback decision is a pure function of its inputs,
//! with no hidden thread-local state.

use std::sync::Arc;

use crate::collector::TransactionNotificationCollector;

/// Context of the request currently producing notifications.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    node_id: String,
    collector: Option<Arc<TransactionNotificationCollector>>,
    has_response: bool,
}

impl RequestContext {
    /// Create a context for the given node, outside any transaction.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            collector: None,
            has_response: false,
        }
    }

    /// Attach the open transaction's collector.
    pub fn with_collector(mut self, collector: Arc<TransactionNotificationCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Record whether an outgoing response vehicle exists.
    pub fn with_response(mut self, has_response: bool) -> Self {
        self.has_response = has_response;
        self
    }

    /// Id of the node executing the current request.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// The open transaction's collector, if any.
    pub fn collector(&self) -> Option<&Arc<TransactionNotificationCollector>> {
        self.collector.as_ref()
    }

    /// Whether an outgoing response exists to carry piggybacked messages.
    pub fn has_response(&self) -> bool {
        self.has_response
    }

    /// Whether local-node deliveries may be redirected to the collector.
    ///
    /// Requires both an attached collector and a response vehicle; whether
    /// the collector still accepts messages is decided at delivery time.
    pub fn piggyback_eligible(&self) -> bool {
        self.collector.is_some() && self.has_response
    }
}
