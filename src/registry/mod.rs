//! Session membership and notification routing.
//!
//! The registry is the directory of node/session/user membership and the
//! single entry point for raising notifications. It resolves an address to
//! the set of target nodes, decides per target between mailbox enqueue and
//! transaction piggyback, and owns mailbox lifecycle: a mailbox is created
//! when a node's first session registers and dropped when its last session
//! unregisters.
//!
//! Delivery is best-effort by contract. Unknown sessions, unknown users and
//! unknown nodes are silently skipped; a full mailbox drops its oldest
//! entry. Nothing here returns an error for ordinary misuse.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::coalesce::Coalescer;
use crate::config::RegistryConfig;
use crate::context::RequestContext;
use crate::mailbox::NodeMailbox;
use crate::message::{Address, NotificationMessage, PutOptions};

/// Where a session currently lives.
#[derive(Debug, Clone)]
struct SessionBinding {
    node_id: String,
    user_id: String,
}

/// Membership maps and mailboxes, all guarded by one lock.
#[derive(Default)]
struct RegistryState {
    mailboxes: HashMap<String, Arc<NodeMailbox>>,
    sessions_by_node: HashMap<String, HashSet<String>>,
    node_by_session: HashMap<String, SessionBinding>,
    sessions_by_user: HashMap<String, HashSet<String>>,
}

/// Directory of cluster membership plus the routing entry point.
///
/// An owned instance, injected into collaborators and shared behind an
/// `Arc`; there is no process-wide singleton.
pub struct NotificationRegistry {
    state: RwLock<RegistryState>,
    config: RegistryConfig,
    coalescers: Vec<Arc<dyn Coalescer>>,
}

impl NotificationRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            config,
            coalescers: Vec::new(),
        }
    }

    /// Register a coalescer, handed to every mailbox created afterwards.
    pub fn with_coalescer(mut self, coalescer: Arc<dyn Coalescer>) -> Self {
        self.coalescers.push(coalescer);
        self
    }

    /// Bind a session (and its user) to a node.
    ///
    /// Idempotent for an identical triple. A session is known to at most
    /// one node: re-registering it elsewhere drops the previous binding
    /// first, the last registration wins.
    pub async fn register_session(&self, node_id: &str, session_id: &str, user_id: &str) {
        let mut state = self.state.write().await;

        if let Some(binding) = state.node_by_session.get(session_id) {
            if binding.node_id == node_id && binding.user_id == user_id {
                return;
            }
            Self::remove_binding(&mut state, session_id);
        }

        state
            .sessions_by_node
            .entry(node_id.to_string())
            .or_default()
            .insert(session_id.to_string());
        if !state.mailboxes.contains_key(node_id) {
            state.mailboxes.insert(
                node_id.to_string(),
                Arc::new(NodeMailbox::new(
                    node_id,
                    self.config.mailbox_capacity,
                    self.coalescers.clone(),
                )),
            );
            debug!(node_id = %node_id, "Created mailbox for node");
        }
        state.node_by_session.insert(
            session_id.to_string(),
            SessionBinding {
                node_id: node_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
        state
            .sessions_by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(session_id.to_string());

        info!(
            node_id = %node_id,
            session_id = %session_id,
            user_id = %user_id,
            "Registered session"
        );
    }

    /// Remove a session binding.
    ///
    /// A no-op unless the exact triple is currently registered. Dropping a
    /// node's last session drops its mailbox, pending notifications
    /// included.
    pub async fn unregister_session(&self, node_id: &str, session_id: &str, user_id: &str) {
        let mut state = self.state.write().await;

        let matches = state
            .node_by_session
            .get(session_id)
            .map_or(false, |b| b.node_id == node_id && b.user_id == user_id);
        if !matches {
            return;
        }

        Self::remove_binding(&mut state, session_id);
        info!(
            node_id = %node_id,
            session_id = %session_id,
            user_id = %user_id,
            "Unregistered session"
        );
    }

    /// Nodes that currently hold at least one registered session.
    pub async fn registered_nodes(&self) -> Vec<String> {
        self.state.read().await.mailboxes.keys().cloned().collect()
    }

    /// Notify every registered node, once per node.
    pub async fn put_for_all_nodes(&self, payload: Value) {
        self.route(Address::AllNodes, payload, PutOptions::default(), None)
            .await;
    }

    /// `put_for_all_nodes` with explicit options.
    pub async fn put_for_all_nodes_with(&self, payload: Value, options: PutOptions) {
        self.route(Address::AllNodes, payload, options, None).await;
    }

    /// Notify the node holding `session_id`; silent no-op when unknown.
    pub async fn put_for_session(&self, session_id: &str, payload: Value) {
        self.route(
            Address::Session(session_id.to_string()),
            payload,
            PutOptions::default(),
            None,
        )
        .await;
    }

    /// `put_for_session` with explicit options.
    pub async fn put_for_session_with(
        &self,
        session_id: &str,
        payload: Value,
        options: PutOptions,
    ) {
        self.route(
            Address::Session(session_id.to_string()),
            payload,
            options,
            None,
        )
        .await;
    }

    /// Notify every node holding a session of `user_id`, once per node.
    pub async fn put_for_user(&self, user_id: &str, payload: Value) {
        self.route(
            Address::User(user_id.to_string()),
            payload,
            PutOptions::default(),
            None,
        )
        .await;
    }

    /// `put_for_user` with explicit options.
    pub async fn put_for_user_with(&self, user_id: &str, payload: Value, options: PutOptions) {
        self.route(Address::User(user_id.to_string()), payload, options, None)
            .await;
    }

    /// Transaction-aware broadcast.
    ///
    /// Resolution matches `put_for_all_nodes`, but a delivery targeting the
    /// caller's own node is redirected to the transaction's collector when
    /// one is active and an outgoing response exists, so the notification
    /// rides along on the response being produced instead of waiting for
    /// the next poll. Remote nodes always get a mailbox enqueue.
    pub async fn put_transactional_for_all_nodes(&self, ctx: &RequestContext, payload: Value) {
        self.route(Address::AllNodes, payload, PutOptions::default(), Some(ctx))
            .await;
    }

    /// Transaction-aware variant of `put_for_session`.
    pub async fn put_transactional_for_session(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        payload: Value,
    ) {
        self.route(
            Address::Session(session_id.to_string()),
            payload,
            PutOptions::default(),
            Some(ctx),
        )
        .await;
    }

    /// Transaction-aware variant of `put_for_user`.
    pub async fn put_transactional_for_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        payload: Value,
    ) {
        self.route(
            Address::User(user_id.to_string()),
            payload,
            PutOptions::default(),
            Some(ctx),
        )
        .await;
    }

    /// Take up to `max_count` notifications for `node_id`, waiting at most
    /// `timeout`.
    ///
    /// An unknown node returns empty immediately.
    pub async fn consume(
        &self,
        node_id: &str,
        max_count: usize,
        timeout: Duration,
    ) -> Vec<NotificationMessage> {
        let mailbox = { self.state.read().await.mailboxes.get(node_id).cloned() };
        match mailbox {
            Some(mailbox) => mailbox.take(max_count, timeout).await,
            None => {
                debug!(node_id = %node_id, "Consume for unknown node");
                Vec::new()
            }
        }
    }

    /// Drop expired notifications from every mailbox.
    pub async fn cleanup(&self) {
        let mailboxes: Vec<Arc<NodeMailbox>> = {
            let state = self.state.read().await;
            state.mailboxes.values().cloned().collect()
        };

        let now = std::time::Instant::now();
        let mut removed = 0;
        for mailbox in mailboxes {
            removed += mailbox.remove_expired(now).await;
        }
        if removed > 0 {
            info!(count = removed, "Removed expired notifications");
        }
    }

    /// Run `cleanup` on a fixed interval until the returned handle is
    /// aborted.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "Starting expiration sweep");
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }

    /// Resolve an address to target mailboxes, once per distinct node.
    async fn resolve_targets(&self, address: &Address) -> Vec<Arc<NodeMailbox>> {
        let state = self.state.read().await;
        match address {
            Address::AllNodes => state.mailboxes.values().cloned().collect(),
            Address::Session(session_id) => state
                .node_by_session
                .get(session_id)
                .and_then(|binding| state.mailboxes.get(&binding.node_id))
                .cloned()
                .into_iter()
                .collect(),
            Address::User(user_id) => {
                let mut node_ids: HashSet<&str> = HashSet::new();
                if let Some(sessions) = state.sessions_by_user.get(user_id) {
                    for session_id in sessions {
                        if let Some(binding) = state.node_by_session.get(session_id) {
                            node_ids.insert(binding.node_id.as_str());
                        }
                    }
                }
                node_ids
                    .into_iter()
                    .filter_map(|node_id| state.mailboxes.get(node_id))
                    .cloned()
                    .collect()
            }
        }
    }

    async fn route(
        &self,
        address: Address,
        payload: Value,
        options: PutOptions,
        ctx: Option<&RequestContext>,
    ) {
        let targets = self.resolve_targets(&address).await;
        if targets.is_empty() {
            debug!(address = ?address, "No registered target, notification dropped");
            return;
        }

        let message = self.build_message(address, payload, options);
        for mailbox in &targets {
            if let Some(ctx) = ctx {
                if ctx.piggyback_eligible() && ctx.node_id() == mailbox.node_id() {
                    if let Some(collector) = ctx.collector() {
                        if collector.add_all(vec![message.clone()]).await {
                            debug!(
                                node_id = %mailbox.node_id(),
                                correlation_id = %message.correlation_id(),
                                "Collected notification for response piggyback"
                            );
                            continue;
                        }
                        // Collector already drained at commit; deliver
                        // through the mailbox like any other node.
                    }
                }
            }
            mailbox.put(message.clone()).await;
        }

        debug!(
            correlation_id = %message.correlation_id(),
            targets = targets.len(),
            "Routed notification"
        );
    }

    fn build_message(&self, address: Address, payload: Value, options: PutOptions) -> NotificationMessage {
        let expires_in = options
            .expires_in
            .unwrap_or_else(|| self.config.default_expires_in());
        let message = NotificationMessage::new(address, payload, expires_in);
        match options.correlation_id {
            Some(id) => message.with_correlation_id(id),
            None => message,
        }
    }

    /// Drop a session from every map; the caller holds the write lock.
    fn remove_binding(state: &mut RegistryState, session_id: &str) {
        let binding = match state.node_by_session.remove(session_id) {
            Some(binding) => binding,
            None => return,
        };

        if let Some(sessions) = state.sessions_by_node.get_mut(&binding.node_id) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                state.sessions_by_node.remove(&binding.node_id);
                state.mailboxes.remove(&binding.node_id);
                debug!(node_id = %binding.node_id, "Dropped mailbox for node without sessions");
            }
        }
        if let Some(sessions) = state.sessions_by_user.get_mut(&binding.user_id) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                state.sessions_by_user.remove(&binding.user_id);
            }
        }
    }
}

impl Default for NotificationRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
