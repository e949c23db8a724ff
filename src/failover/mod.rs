//! Primary failure handling: promote the least-lagged healthy replica.
//!
//! Only one failover may run at a time; a concurrent trigger is rejected
//! with `FailoverAlreadyInProgress` instead of queuing. A failover that
//! finds no healthy replica is the terminal unrecoverable case: it is
//! surfaced loudly and the topology stays untouched.

use crate::core::cluster::Cluster;
use crate::core::NodeId;
use crate::error::{RelevoError, RelevoResult};
use crate::health::HealthMonitor;
use crate::lag::{LagDetector, SEVERE_LAG};
use crate::utils::format_duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// Failover state machine: Stable -> FailoverInProgress -> Stable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverState {
    Stable,
    FailoverInProgress,
}

struct Worker {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Reacts to sustained primary failure by promoting a replica
pub struct FailoverManager {
    cluster: Arc<Cluster>,
    health: Arc<HealthMonitor>,
    lag: Arc<LagDetector>,
    failure_threshold: u32,
    in_progress: AtomicBool,
    worker: Mutex<Option<Worker>>,
}

/// Resets the in-progress flag on every exit path
struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FailoverManager {
    pub fn new(
        cluster: Arc<Cluster>,
        health: Arc<HealthMonitor>,
        lag: Arc<LagDetector>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            cluster,
            health,
            lag,
            failure_threshold,
            in_progress: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    /// Current state of the failover machine
    pub fn state(&self) -> FailoverState {
        if self.in_progress.load(Ordering::Acquire) {
            FailoverState::FailoverInProgress
        } else {
            FailoverState::Stable
        }
    }

    /// Whether the primary has failed enough consecutive checks to trigger
    pub async fn primary_down(&self) -> bool {
        let primary = self.cluster.primary().await;
        self.health.consecutive_failures(primary.id()).await >= self.failure_threshold
    }

    /// Run a failover when the failure threshold has been reached
    pub async fn maybe_failover(&self) -> RelevoResult<Option<NodeId>> {
        if !self.primary_down().await {
            return Ok(None);
        }
        self.handle_primary_failure().await.map(Some)
    }

    /// Promote the least-lagged healthy replica to primary.
    ///
    /// Returns the id of the new primary. Fails with
    /// `FailoverAlreadyInProgress` if another failover is running, or
    /// `NoHealthyReplicaAvailable` when nothing can be promoted; the
    /// topology is left unchanged on any failure.
    pub async fn handle_primary_failure(&self) -> RelevoResult<NodeId> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RelevoError::FailoverAlreadyInProgress);
        }
        let _guard = InProgressGuard(&self.in_progress);

        let old_primary = self.cluster.primary().await.id().clone();
        tracing::warn!("Failover triggered: primary {} considered failed", old_primary);

        let mut best: Option<(NodeId, Duration)> = None;
        for replica in self.health.healthy_replicas().await {
            let lag = self
                .lag
                .lag_of(replica.id())
                .await
                .unwrap_or(SEVERE_LAG);
            let better = match &best {
                Some((_, best_lag)) => lag < *best_lag,
                None => true,
            };
            if better {
                best = Some((replica.id().clone(), lag));
            }
        }

        let Some((target, target_lag)) = best else {
            tracing::error!(
                "Failover aborted: no healthy replica available to replace primary {}",
                old_primary
            );
            return Err(RelevoError::NoHealthyReplicaAvailable);
        };

        self.cluster.promote(&target).await?;
        tracing::info!(
            "Failover complete: promoted {} (lag {}) to primary, demoted {}",
            target,
            format_duration(target_lag),
            old_primary
        );
        Ok(target)
    }

    /// Start watching the health table, failing over automatically once the
    /// primary crosses the failure threshold
    pub async fn start(self: Arc<Self>, check_interval: Duration) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            tracing::warn!("Failover watcher already running");
            return;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let manager = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match manager.maybe_failover().await {
                            Ok(Some(new_primary)) => {
                                tracing::info!("Automatic failover promoted {}", new_primary);
                            }
                            Ok(None) => {}
                            Err(RelevoError::FailoverAlreadyInProgress) => {}
                            Err(e) => tracing::error!("Automatic failover failed: {}", e),
                        }
                    }
                    _ = &mut stop_rx => break,
                }
            }
        });

        *worker = Some(Worker {
            stop: stop_tx,
            handle,
        });
    }

    /// Stop the watcher and wait for it to exit. Idempotent.
    pub async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(());
            let _ = worker.handle.await;
        }
    }
}
