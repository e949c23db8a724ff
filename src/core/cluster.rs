//! Cluster topology: one primary handle plus N replica handles.
//!
//! The primary pointer is reassigned only by promotion, under the topology
//! write lock. Readers always get cloned snapshots, never a live view, so a
//! concurrent failover cannot tear a caller's iteration.

use crate::config::NodeConfig;
use crate::core::{DatabaseConnector, NodeHandle, NodeId};
use crate::error::{RelevoError, RelevoResult};
use tokio::sync::RwLock;

struct Topology {
    primary: NodeHandle,
    replicas: Vec<NodeHandle>,
}

/// Aggregate holding the primary and replica handles of one cluster
pub struct Cluster {
    topology: RwLock<Topology>,
}

impl Cluster {
    /// Build a cluster from already-opened handles
    pub fn new(primary: NodeHandle, replicas: Vec<NodeHandle>) -> Self {
        Self {
            topology: RwLock::new(Topology { primary, replicas }),
        }
    }

    /// Open and ping every configured node.
    ///
    /// Fails with a `Connection` error naming the offending node; handles
    /// already opened at that point are closed before returning, so a partial
    /// failure never leaks connections.
    pub async fn connect(
        connector: &dyn DatabaseConnector,
        primary: &NodeConfig,
        replicas: &[NodeConfig],
    ) -> RelevoResult<Self> {
        let mut opened: Vec<NodeHandle> = Vec::with_capacity(1 + replicas.len());

        for node in std::iter::once(primary).chain(replicas.iter()) {
            match Self::open_node(connector, node).await {
                Ok(handle) => opened.push(handle),
                Err(e) => {
                    for handle in &opened {
                        if let Err(close_err) = handle.close().await {
                            tracing::warn!(
                                "Failed to close handle for {} during cleanup: {}",
                                handle.id(),
                                close_err
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let primary_handle = opened.remove(0);
        tracing::info!(
            "Cluster connected: primary={}, replicas={}",
            primary_handle.id(),
            opened.len()
        );
        Ok(Self::new(primary_handle, opened))
    }

    async fn open_node(
        connector: &dyn DatabaseConnector,
        node: &NodeConfig,
    ) -> RelevoResult<NodeHandle> {
        let handle = connector
            .connect(node)
            .await
            .map_err(|e| RelevoError::connection(node.id.as_str(), e.to_string()))?;

        if let Err(e) = handle.ping().await {
            let _ = handle.close().await;
            return Err(RelevoError::connection(node.id.as_str(), e.to_string()));
        }

        Ok(handle)
    }

    /// Current primary handle (cheap snapshot, no I/O)
    pub async fn primary(&self) -> NodeHandle {
        self.topology.read().await.primary.clone()
    }

    /// Snapshot of the current replica handles
    pub async fn replicas(&self) -> Vec<NodeHandle> {
        self.topology.read().await.replicas.clone()
    }

    /// Snapshot of every node, primary first
    pub async fn all_nodes(&self) -> Vec<NodeHandle> {
        let topo = self.topology.read().await;
        let mut nodes = Vec::with_capacity(1 + topo.replicas.len());
        nodes.push(topo.primary.clone());
        nodes.extend(topo.replicas.iter().cloned());
        nodes
    }

    /// Swap the primary pointer to the given replica.
    ///
    /// The target must be a current replica; the old primary is pushed back
    /// onto the replica list so it can rejoin once it recovers.
    pub async fn promote(&self, target: &NodeId) -> RelevoResult<()> {
        let mut topo = self.topology.write().await;

        let index = topo
            .replicas
            .iter()
            .position(|replica| replica.id() == target)
            .ok_or_else(|| RelevoError::invalid_promotion_target(target.as_str()))?;

        let new_primary = topo.replicas.remove(index);
        let old_primary = std::mem::replace(&mut topo.primary, new_primary);
        tracing::debug!(
            "Primary pointer swapped: {} -> {}",
            old_primary.id(),
            target
        );
        topo.replicas.push(old_primary);

        Ok(())
    }

    /// Close every handle, aggregating failures instead of short-circuiting
    pub async fn close(&self) -> RelevoResult<()> {
        let nodes = self.all_nodes().await;
        let mut failures = Vec::new();

        for node in nodes {
            if let Err(e) = node.close().await {
                failures.push(format!("{}: {}", node.id(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RelevoError::internal(format!(
                "failed to close {} node(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }
}
