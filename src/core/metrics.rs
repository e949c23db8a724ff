//! Thread-safe routing counters and per-node latency accumulators.
//!
//! Counters are monotonic atomics incremented from arbitrary tasks; a
//! snapshot read can never observe a torn update or lose an increment.

use crate::core::NodeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

#[derive(Default)]
struct NodeLatency {
    samples: AtomicU64,
    total_micros: AtomicU64,
}

/// Concurrent routing metrics
#[derive(Default)]
pub struct RoutingMetrics {
    reads: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
    fallbacks: AtomicU64,
    per_node: RwLock<HashMap<NodeId, Arc<NodeLatency>>>,
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingStats {
    pub reads: u64,
    pub writes: u64,
    pub errors: u64,
    /// Reads served by the primary because no acceptable replica existed
    pub replica_fallbacks: u64,
    pub per_node: HashMap<NodeId, NodeLatencyStats>,
}

/// Latency summary for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLatencyStats {
    pub samples: u64,
    pub total_latency: Duration,
}

impl NodeLatencyStats {
    pub fn average(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total_latency / self.samples as u32
        }
    }
}

impl RoutingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a read routed to the given node
    pub fn record_read(&self, node: &NodeId, latency: Duration) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let entry = self.node_latency(node);
        entry
            .total_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        entry.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write routed to the primary
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query error observed by the caller
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a read that fell back to the primary for lack of replicas
    pub fn record_replica_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn node_latency(&self, node: &NodeId) -> Arc<NodeLatency> {
        if let Some(entry) = self.per_node.read().unwrap().get(node) {
            return Arc::clone(entry);
        }
        let mut table = self.per_node.write().unwrap();
        Arc::clone(table.entry(node.clone()).or_default())
    }

    /// Current snapshot of all counters
    pub fn stats(&self) -> RoutingStats {
        let per_node = self
            .per_node
            .read()
            .unwrap()
            .iter()
            .map(|(id, latency)| {
                (
                    id.clone(),
                    NodeLatencyStats {
                        samples: latency.samples.load(Ordering::Relaxed),
                        total_latency: Duration::from_micros(
                            latency.total_micros.load(Ordering::Relaxed),
                        ),
                    },
                )
            })
            .collect();

        RoutingStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            replica_fallbacks: self.fallbacks.load(Ordering::Relaxed),
            per_node,
        }
    }
}
