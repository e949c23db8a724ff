//! Shared test doubles for the engine's database-handle seam.

use crate::config::NodeConfig;
use crate::core::{DatabaseConnector, DatabaseHandle, NodeHandle, NodeId, Transaction};
use crate::error::{RelevoError, RelevoResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory database handle with scriptable reachability and position.
pub struct StubHandle {
    id: NodeId,
    reachable: AtomicBool,
    position: AtomicU64,
    position_errors: AtomicBool,
    closed: AtomicBool,
}

impl StubHandle {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: NodeId::new(id),
            reachable: AtomicBool::new(true),
            position: AtomicU64::new(0),
            position_errors: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_position(&self, position: u64) {
        self.position.store(position, Ordering::SeqCst);
    }

    /// Make replication_position fail while ping still succeeds
    pub fn set_position_errors(&self, errors: bool) {
        self.position_errors.store(errors, Ordering::SeqCst);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DatabaseHandle for StubHandle {
    fn id(&self) -> &NodeId {
        &self.id
    }

    async fn ping(&self) -> RelevoResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RelevoError::connection(self.id.as_str(), "stub unreachable"))
        }
    }

    async fn query_scalar(&self, _query: &str) -> RelevoResult<i64> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(self.position.load(Ordering::SeqCst) as i64)
        } else {
            Err(RelevoError::connection(self.id.as_str(), "stub unreachable"))
        }
    }

    async fn replication_position(&self) -> RelevoResult<u64> {
        if !self.reachable.load(Ordering::SeqCst) || self.position_errors.load(Ordering::SeqCst) {
            return Err(RelevoError::connection(
                self.id.as_str(),
                "position probe failed",
            ));
        }
        Ok(self.position.load(Ordering::SeqCst))
    }

    async fn begin_tx(&self) -> RelevoResult<Box<dyn Transaction>> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(Box::new(StubTransaction))
        } else {
            Err(RelevoError::connection(self.id.as_str(), "stub unreachable"))
        }
    }

    async fn close(&self) -> RelevoResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct StubTransaction;

#[async_trait]
impl Transaction for StubTransaction {
    async fn commit(self: Box<Self>) -> RelevoResult<()> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> RelevoResult<()> {
        Ok(())
    }
}

/// Connector returning stub handles; can be told to fail a given node id.
pub struct StubConnector {
    fail_node: Option<String>,
    opened: Mutex<Vec<Arc<StubHandle>>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self {
            fail_node: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(node_id: &str) -> Self {
        Self {
            fail_node: Some(node_id.to_string()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Handles opened so far, in connect order
    pub fn opened(&self) -> Vec<Arc<StubHandle>> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatabaseConnector for StubConnector {
    async fn connect(&self, node: &NodeConfig) -> RelevoResult<NodeHandle> {
        if self.fail_node.as_deref() == Some(node.id.as_str()) {
            return Err(RelevoError::connection(node.id.as_str(), "refused"));
        }
        let handle = StubHandle::new(&node.id);
        self.opened.lock().unwrap().push(Arc::clone(&handle));
        Ok(handle)
    }
}

pub fn node_config(id: &str) -> NodeConfig {
    NodeConfig {
        id: id.to_string(),
        dsn: format!("stub://{}", id),
    }
}
