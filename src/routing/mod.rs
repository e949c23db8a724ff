//! Read/write routing over the cluster.
//!
//! The hot path only reads the health and lag tables populated by the
//! background monitors; it never waits on a probe in flight. Replica
//! unavailability degrades to the primary instead of failing the caller.
pub mod strategy;

use crate::core::cluster::Cluster;
use crate::core::metrics::RoutingMetrics;
use crate::core::session::SessionTracker;
use crate::core::NodeHandle;
use crate::lag::LagDetector;
use crate::routing::strategy::RoutingStrategy;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Consistency guarantee requested for a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Always read from the primary
    Strong,
    /// Read from the primary inside the session's sticky window, replicas after
    ReadAfterWrite,
    /// Prefer a healthy low-lag replica
    Eventual,
}

/// Routes each operation to the node that should serve it
pub struct RoutingManager {
    cluster: Arc<Cluster>,
    lag: Arc<LagDetector>,
    strategy: Box<dyn RoutingStrategy>,
    metrics: Arc<RoutingMetrics>,
    sessions: Arc<SessionTracker>,
    max_replica_lag: Duration,
}

impl RoutingManager {
    pub fn new(
        cluster: Arc<Cluster>,
        lag: Arc<LagDetector>,
        strategy: Box<dyn RoutingStrategy>,
        sessions: Arc<SessionTracker>,
        max_replica_lag: Duration,
    ) -> Self {
        Self {
            cluster,
            lag,
            strategy,
            metrics: Arc::new(RoutingMetrics::new()),
            sessions,
            max_replica_lag,
        }
    }

    /// Node that should serve a write: always the current primary.
    ///
    /// Supplying a session key opens that session's sticky window so its
    /// subsequent `ReadAfterWrite` reads see the write.
    pub async fn route_write(&self, session_key: Option<&str>) -> NodeHandle {
        if let Some(key) = session_key {
            self.sessions.record_write(key).await;
        }
        self.metrics.record_write();
        self.cluster.primary().await
    }

    /// Node that should serve a read under the requested consistency level
    pub async fn route_read(
        &self,
        consistency: Consistency,
        session_key: Option<&str>,
    ) -> NodeHandle {
        let started = Instant::now();

        let chosen = match consistency {
            Consistency::Strong => self.cluster.primary().await,
            Consistency::ReadAfterWrite => match session_key {
                Some(key) if self.sessions.is_sticky(key).await => {
                    tracing::trace!("Session {} inside sticky window, read pinned to primary", key);
                    self.cluster.primary().await
                }
                _ => self.pick_replica().await,
            },
            Consistency::Eventual => self.pick_replica().await,
        };

        self.metrics.record_read(chosen.id(), started.elapsed());
        chosen
    }

    /// Select among healthy low-lag replicas, degrading to the primary when
    /// none qualifies (normal degraded mode, not an error)
    async fn pick_replica(&self) -> NodeHandle {
        let candidates = self.lag.low_lag_replicas(self.max_replica_lag).await;
        match self.strategy.select(&candidates) {
            Some(handle) => handle,
            None => {
                self.metrics.record_replica_fallback();
                tracing::debug!("No acceptable replica available, serving read from primary");
                self.cluster.primary().await
            }
        }
    }

    /// Routing metrics shared with the embedding application
    pub fn metrics(&self) -> Arc<RoutingMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Session tracker backing read-after-write consistency
    pub fn sessions(&self) -> Arc<SessionTracker> {
        Arc::clone(&self.sessions)
    }
}
