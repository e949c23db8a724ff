//! Core abstractions shared across the routing engine
pub mod cluster;
pub mod metrics;
pub mod session;

use crate::error::RelevoResult;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a database node.
///
/// Handles are compared by identity, never by value; this is the key of the
/// health table, the lag table, and the per-node metrics map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Shared reference to a live database connection
pub type NodeHandle = Arc<dyn DatabaseHandle>;

/// Opaque connection to one database node.
///
/// The actual driver lives outside this crate; the engine only needs a
/// liveness probe, a scalar query, a monotonic replication position, and
/// transaction/close hooks. Every method is expected to respect the caller's
/// timeout (probes in this crate are wrapped in `tokio::time::timeout`).
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Stable identity of this node
    fn id(&self) -> &NodeId;

    /// Lightweight liveness probe
    async fn ping(&self) -> RelevoResult<()>;

    /// Execute a query returning a single scalar value
    async fn query_scalar(&self, query: &str) -> RelevoResult<i64>;

    /// Current replication position as a monotonic counter.
    ///
    /// On the primary this is the latest produced position; on a replica it
    /// is the latest applied position. Positions are logical ticks, not
    /// wall-clock timestamps, so clock skew between nodes cannot produce
    /// misleading lag figures.
    async fn replication_position(&self) -> RelevoResult<u64>;

    /// Open a transaction on this node
    async fn begin_tx(&self) -> RelevoResult<Box<dyn Transaction>>;

    /// Close the underlying connection
    async fn close(&self) -> RelevoResult<()>;
}

/// An open transaction on a single node.
///
/// Commit and rollback consume the transaction, so a finished transaction
/// cannot be reused. Implementations must roll back a transaction that is
/// dropped without an explicit commit. Write transactions are always opened
/// against the primary; no transaction ever spans multiple nodes.
#[async_trait]
pub trait Transaction: Send {
    async fn commit(self: Box<Self>) -> RelevoResult<()>;
    async fn rollback(self: Box<Self>) -> RelevoResult<()>;
}

/// Factory turning node configuration into live handles.
///
/// Implemented by the embedding application for its driver of choice.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    async fn connect(&self, node: &crate::config::NodeConfig) -> RelevoResult<NodeHandle>;
}
