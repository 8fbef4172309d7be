//! Signalbox - notification fan-out for clustered servers.
//!
//! Distributes server-originated state-change notifications to client
//! sessions pinned to the nodes of a cluster: one bounded, lossy mailbox
//! per node, a registry routing session/user/broadcast addresses to nodes,
//! and a transaction-scoped collector that piggybacks local notifications
//! onto the response of the request that produced them.

pub mod coalesce;
pub mod collector;
pub mod config;
pub mod context;
pub mod mailbox;
pub mod message;
pub mod registry;
pub mod utils;
