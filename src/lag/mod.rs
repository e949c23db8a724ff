//! Replication lag measurement against a monotonic position counter.
//!
//! The primary is asked for a reference position and every replica for its
//! own applied position; lag is the positive delta converted to a duration
//! through a configured throughput constant. Positions are logical ticks
//! rather than wall-clock reads, so clock skew between nodes cannot produce
//! negative or inflated lag. A replica whose probe fails is recorded with a
//! severe sentinel instead of being dropped, so any sane threshold excludes
//! it naturally.

use crate::core::cluster::Cluster;
use crate::core::{NodeHandle, NodeId};
use crate::health::HealthMonitor;
use crate::utils::format_duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Lag assigned to replicas whose position probe errors or times out
pub const SEVERE_LAG: Duration = Duration::from_secs(3600);

/// Last lag measurement for one replica
#[derive(Debug, Clone)]
pub struct LagRecord {
    pub lag: Duration,
    pub measured_at: Instant,
}

struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background replication lag detector
pub struct LagDetector {
    cluster: Arc<Cluster>,
    health: Arc<HealthMonitor>,
    table: Arc<RwLock<HashMap<NodeId, LagRecord>>>,
    interval: Duration,
    probe_timeout: Duration,
    positions_per_sec: u64,
    worker: Mutex<Option<Worker>>,
}

impl LagDetector {
    pub fn new(
        cluster: Arc<Cluster>,
        health: Arc<HealthMonitor>,
        interval: Duration,
        probe_timeout: Duration,
        positions_per_sec: u64,
    ) -> Self {
        Self {
            cluster,
            health,
            table: Arc::new(RwLock::new(HashMap::new())),
            interval,
            probe_timeout,
            // A zero throughput constant would divide every delta to a
            // non-finite duration
            positions_per_sec: positions_per_sec.max(1),
            worker: Mutex::new(None),
        }
    }

    /// Start the periodic measurement loop
    pub async fn start(self: Arc<Self>) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            tracing::warn!("Lag detector already running");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let detector = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(detector.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Transient failures only update state and log; they
                        // never propagate to routing callers
                        if let Err(e) = detector.check_replication_lag().await {
                            tracing::warn!("Lag measurement cycle failed: {}", e);
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
            tracing::debug!("Lag detector loop exited");
        });

        *worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
        tracing::info!(
            "Lag detector started (interval {}, probe timeout {})",
            format_duration(self.interval),
            format_duration(self.probe_timeout)
        );
    }

    /// Stop the measurement loop and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            let _ = worker.handle.await;
            tracing::info!("Lag detector stopped");
        }
    }

    /// Measure lag for every replica against the primary's position.
    ///
    /// The primary probe failing is the only hard error; per-replica probe
    /// failures record the severe sentinel and the sweep continues.
    pub async fn check_replication_lag(&self) -> crate::error::RelevoResult<HashMap<NodeId, Duration>> {
        let primary = self.cluster.primary().await;
        let reference = match timeout(self.probe_timeout, primary.replication_position()).await {
            Ok(Ok(position)) => position,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(crate::error::RelevoError::timeout(format!(
                    "replication position probe on primary {}",
                    primary.id()
                )))
            }
        };

        let replicas = self.cluster.replicas().await;
        let probes = replicas.iter().map(|replica| {
            let replica = Arc::clone(replica);
            async move {
                let lag = match timeout(self.probe_timeout, replica.replication_position()).await {
                    Ok(Ok(position)) => {
                        self.position_delta_to_duration(reference.saturating_sub(position))
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            "Lag probe failed for replica {}, recording severe lag: {}",
                            replica.id(),
                            e
                        );
                        SEVERE_LAG
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Lag probe timed out for replica {}, recording severe lag",
                            replica.id()
                        );
                        SEVERE_LAG
                    }
                };
                (replica.id().clone(), lag)
            }
        });
        let measurements: HashMap<NodeId, Duration> =
            futures::future::join_all(probes).await.into_iter().collect();

        let now = Instant::now();
        let mut table = self.table.write().await;
        for (id, lag) in &measurements {
            table.insert(
                id.clone(),
                LagRecord {
                    lag: *lag,
                    measured_at: now,
                },
            );
        }

        Ok(measurements)
    }

    /// Estimated duration for a replication position delta
    fn position_delta_to_duration(&self, delta: u64) -> Duration {
        Duration::from_secs_f64(delta as f64 / self.positions_per_sec as f64)
    }

    /// Last measured lag for a node, if any measurement exists
    pub async fn lag_of(&self, node: &NodeId) -> Option<Duration> {
        let table = self.table.read().await;
        table.get(node).map(|record| record.lag)
    }

    /// Healthy replicas whose last-measured lag is within the threshold.
    ///
    /// Replicas without a measurement yet are excluded; callers fall back to
    /// the primary when this comes back empty.
    pub async fn low_lag_replicas(&self, max_lag: Duration) -> Vec<NodeHandle> {
        let healthy = self.health.healthy_replicas().await;
        let table = self.table.read().await;
        healthy
            .into_iter()
            .filter(|replica| {
                table
                    .get(replica.id())
                    .map(|record| record.lag <= max_lag)
                    .unwrap_or(false)
            })
            .collect()
    }
}
