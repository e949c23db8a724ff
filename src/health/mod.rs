//! Periodic liveness probing for every cluster node.
//!
//! The monitor pings all nodes concurrently on a fixed interval, each probe
//! bounded by a short timeout so one stalled node cannot wedge the sweep.
//! Routing reads the resulting table through read locks and never waits on a
//! probe in flight.

use crate::core::cluster::Cluster;
use crate::core::{NodeHandle, NodeId};
use crate::utils::format_duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Health state machine per node: Unknown -> Healthy <-> Unhealthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Probe bookkeeping for one node
#[derive(Debug, Clone)]
pub struct HealthRecord {
    pub state: HealthState,
    pub last_checked: Option<Instant>,
    pub consecutive_failures: u32,
}

impl HealthRecord {
    fn new() -> Self {
        Self {
            state: HealthState::Unknown,
            last_checked: None,
            consecutive_failures: 0,
        }
    }

    /// A node is treated as healthy until a probe says otherwise
    pub fn is_healthy(&self) -> bool {
        !matches!(self.state, HealthState::Unhealthy)
    }
}

struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background health monitor over the cluster's nodes
pub struct HealthMonitor {
    cluster: Arc<Cluster>,
    table: Arc<RwLock<HashMap<NodeId, HealthRecord>>>,
    interval: Duration,
    probe_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl HealthMonitor {
    pub fn new(cluster: Arc<Cluster>, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            cluster,
            table: Arc::new(RwLock::new(HashMap::new())),
            interval,
            probe_timeout,
            worker: Mutex::new(None),
        }
    }

    /// Start the periodic probe loop
    pub async fn start(self: Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            tracing::warn!("Health monitor already running");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let monitor = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => monitor.check_all().await,
                    _ = &mut stop_rx => break,
                }
            }
            tracing::debug!("Health monitor loop exited");
        });

        *worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
        tracing::info!(
            "Health monitor started (interval {}, probe timeout {})",
            format_duration(self.interval),
            format_duration(self.probe_timeout)
        );
    }

    /// Stop the probe loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            let _ = worker.handle.await;
            tracing::info!("Health monitor stopped");
        }
    }

    /// Probe every node once, concurrently, and update the health table
    pub async fn check_all(&self) {
        let nodes = self.cluster.all_nodes().await;

        let probes = nodes.iter().map(|node| {
            let node = Arc::clone(node);
            async move {
                let outcome = match timeout(self.probe_timeout, node.ping()).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "probe timed out after {}",
                        format_duration(self.probe_timeout)
                    )),
                };
                (node.id().clone(), outcome)
            }
        });
        let results = futures::future::join_all(probes).await;

        let mut table = self.table.write().await;
        for (id, outcome) in results {
            let record = table.entry(id.clone()).or_insert_with(HealthRecord::new);
            match outcome {
                Ok(()) => {
                    if record.state == HealthState::Unhealthy {
                        tracing::info!(
                            "Node {} recovered after {} failed check(s)",
                            id,
                            record.consecutive_failures
                        );
                    }
                    record.state = HealthState::Healthy;
                    record.consecutive_failures = 0;
                }
                Err(reason) => {
                    record.consecutive_failures += 1;
                    if record.state != HealthState::Unhealthy {
                        tracing::warn!("Node {} became unhealthy: {}", id, reason);
                    }
                    record.state = HealthState::Unhealthy;
                }
            }
            record.last_checked = Some(Instant::now());
        }
    }

    /// Current health of a node; nodes never probed count as healthy,
    /// matching the all-healthy assumption at cluster construction
    pub async fn is_healthy(&self, node: &NodeId) -> bool {
        let table = self.table.read().await;
        table.get(node).map(HealthRecord::is_healthy).unwrap_or(true)
    }

    /// Current state of a node's health machine
    pub async fn state(&self, node: &NodeId) -> HealthState {
        let table = self.table.read().await;
        table
            .get(node)
            .map(|record| record.state)
            .unwrap_or(HealthState::Unknown)
    }

    /// Consecutive failed probes for a node
    pub async fn consecutive_failures(&self, node: &NodeId) -> u32 {
        let table = self.table.read().await;
        table
            .get(node)
            .map(|record| record.consecutive_failures)
            .unwrap_or(0)
    }

    /// Snapshot of replica handles currently considered healthy
    pub async fn healthy_replicas(&self) -> Vec<NodeHandle> {
        let replicas = self.cluster.replicas().await;
        let table = self.table.read().await;
        replicas
            .into_iter()
            .filter(|replica| {
                table
                    .get(replica.id())
                    .map(HealthRecord::is_healthy)
                    .unwrap_or(true)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DatabaseHandle, Transaction};
    use crate::error::{RelevoError, RelevoResult};
    use crate::test_util::StubHandle;
    use async_trait::async_trait;

    fn monitor_over(
        primary: Arc<StubHandle>,
        replicas: Vec<Arc<StubHandle>>,
    ) -> Arc<HealthMonitor> {
        let replicas = replicas
            .into_iter()
            .map(|r| r as NodeHandle)
            .collect::<Vec<_>>();
        let cluster = Arc::new(Cluster::new(primary, replicas));
        Arc::new(HealthMonitor::new(
            cluster,
            Duration::from_millis(10),
            Duration::from_millis(50),
        ))
    }

    #[tokio::test]
    async fn test_nodes_assumed_healthy_before_first_probe() {
        let monitor = monitor_over(StubHandle::new("primary"), vec![StubHandle::new("replica-a")]);

        assert!(monitor.is_healthy(&NodeId::new("primary")).await);
        assert_eq!(monitor.state(&NodeId::new("primary")).await, HealthState::Unknown);
        assert_eq!(monitor.healthy_replicas().await.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_transitions() {
        let replica = StubHandle::new("replica-a");
        let monitor = monitor_over(StubHandle::new("primary"), vec![replica.clone()]);

        monitor.check_all().await;
        assert_eq!(monitor.state(&NodeId::new("replica-a")).await, HealthState::Healthy);

        replica.set_reachable(false);
        monitor.check_all().await;
        monitor.check_all().await;
        assert_eq!(
            monitor.state(&NodeId::new("replica-a")).await,
            HealthState::Unhealthy
        );
        assert_eq!(monitor.consecutive_failures(&NodeId::new("replica-a")).await, 2);
        assert!(monitor.healthy_replicas().await.is_empty());

        // Recovery resets the failure counter
        replica.set_reachable(true);
        monitor.check_all().await;
        assert_eq!(monitor.state(&NodeId::new("replica-a")).await, HealthState::Healthy);
        assert_eq!(monitor.consecutive_failures(&NodeId::new("replica-a")).await, 0);
        assert_eq!(monitor.healthy_replicas().await.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_timeout_marks_unhealthy() {
        struct HangingHandle {
            id: NodeId,
        }

        #[async_trait]
        impl DatabaseHandle for HangingHandle {
            fn id(&self) -> &NodeId {
                &self.id
            }
            async fn ping(&self) -> RelevoResult<()> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
            async fn query_scalar(&self, _query: &str) -> RelevoResult<i64> {
                Ok(0)
            }
            async fn replication_position(&self) -> RelevoResult<u64> {
                Ok(0)
            }
            async fn begin_tx(&self) -> RelevoResult<Box<dyn Transaction>> {
                Err(RelevoError::internal("not supported"))
            }
            async fn close(&self) -> RelevoResult<()> {
                Ok(())
            }
        }

        let hanging = Arc::new(HangingHandle {
            id: NodeId::new("replica-a"),
        });
        let cluster = Arc::new(Cluster::new(StubHandle::new("primary"), vec![hanging]));
        let monitor = HealthMonitor::new(
            cluster,
            Duration::from_millis(10),
            Duration::from_millis(20),
        );

        monitor.check_all().await;
        assert_eq!(
            monitor.state(&NodeId::new("replica-a")).await,
            HealthState::Unhealthy
        );
        assert_eq!(monitor.state(&NodeId::new("primary")).await, HealthState::Healthy);
    }

    #[tokio::test]
    async fn test_start_stop_is_idempotent_and_joins_loop() {
        let replica = StubHandle::new("replica-a");
        replica.set_reachable(false);
        let monitor = monitor_over(StubHandle::new("primary"), vec![replica]);

        Arc::clone(&monitor).start().await;
        // Second start is a no-op
        Arc::clone(&monitor).start().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            monitor.state(&NodeId::new("replica-a")).await,
            HealthState::Unhealthy
        );

        monitor.stop().await;
        monitor.stop().await;
        assert!(monitor.worker.lock().await.is_none());
    }
}
