//! Relevo - read-replica routing and failover engine for primary/replica
//! database clusters.
//!
//! The engine decides, per operation, which node should serve a query,
//! tracks node health and replication lag through background monitors,
//! applies the requested consistency guarantee, and promotes a replica when
//! the primary sustains failures. The SQL driver stays outside: the
//! embedding application supplies a [`core::DatabaseConnector`] and executes
//! queries against the handles the router returns.

pub mod config;
pub mod core;
pub mod error;
pub mod failover;
pub mod health;
pub mod lag;
pub mod routing;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_util;

use crate::config::Config;
use crate::core::cluster::Cluster;
use crate::core::session::SessionTracker;
use crate::core::DatabaseConnector;
use crate::error::RelevoResult;
use crate::failover::FailoverManager;
use crate::health::HealthMonitor;
use crate::lag::LagDetector;
use crate::routing::strategy::build_strategy;
use crate::routing::RoutingManager;
use std::sync::Arc;
use std::time::Duration;

/// Fully wired routing engine: cluster, monitors, router and failover.
///
/// Built from a validated [`Config`] and the application's connector;
/// `start()` launches the background loops, `stop()` joins them, and
/// `shutdown()` additionally closes every database handle.
pub struct Relevo {
    cluster: Arc<Cluster>,
    health: Arc<HealthMonitor>,
    lag: Arc<LagDetector>,
    router: Arc<RoutingManager>,
    failover: Arc<FailoverManager>,
    health_interval: Duration,
}

impl Relevo {
    /// Open every configured node and wire the engine together
    pub async fn connect(config: &Config, connector: &dyn DatabaseConnector) -> RelevoResult<Self> {
        config.validate()?;

        let cluster = Arc::new(
            Cluster::connect(connector, &config.cluster.primary, &config.cluster.replicas).await?,
        );

        let health_interval = Duration::from_secs(config.health.interval_sec);
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&cluster),
            health_interval,
            Duration::from_secs(config.health.timeout_sec),
        ));
        let lag = Arc::new(LagDetector::new(
            Arc::clone(&cluster),
            Arc::clone(&health),
            Duration::from_secs(config.lag.interval_sec),
            Duration::from_secs(config.lag.timeout_sec),
            config.lag.positions_per_sec,
        ));

        let sessions = Arc::new(SessionTracker::new(Duration::from_secs(
            config.routing.session_sticky_sec,
        )));
        let router = Arc::new(RoutingManager::new(
            Arc::clone(&cluster),
            Arc::clone(&lag),
            build_strategy(&config.routing.strategy),
            sessions,
            Duration::from_millis(config.routing.max_replica_lag_ms),
        ));

        let failover = Arc::new(FailoverManager::new(
            Arc::clone(&cluster),
            Arc::clone(&health),
            Arc::clone(&lag),
            config.health.failure_threshold,
        ));

        Ok(Self {
            cluster,
            health,
            lag,
            router,
            failover,
            health_interval,
        })
    }

    /// Start the health, lag and failover background loops
    pub async fn start(&self) {
        Arc::clone(&self.health).start().await;
        Arc::clone(&self.lag).start().await;
        Arc::clone(&self.failover).start(self.health_interval).await;
        self.router.sessions().start_cleanup_task().await;
        tracing::info!("Relevo engine started");
    }

    /// Stop the background loops and wait for them to exit. Idempotent.
    pub async fn stop(&self) {
        self.failover.stop().await;
        self.lag.stop().await;
        self.health.stop().await;
        self.router.sessions().stop_cleanup_task().await;
        tracing::info!("Relevo engine stopped");
    }

    /// Stop the loops and close every database handle
    pub async fn shutdown(&self) -> RelevoResult<()> {
        self.stop().await;
        self.cluster.close().await
    }

    pub fn router(&self) -> Arc<RoutingManager> {
        Arc::clone(&self.router)
    }

    pub fn cluster(&self) -> Arc<Cluster> {
        Arc::clone(&self.cluster)
    }

    pub fn health_monitor(&self) -> Arc<HealthMonitor> {
        Arc::clone(&self.health)
    }

    pub fn lag_detector(&self) -> Arc<LagDetector> {
        Arc::clone(&self.lag)
    }

    pub fn failover_manager(&self) -> Arc<FailoverManager> {
        Arc::clone(&self.failover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;
    use crate::error::RelevoError;
    use crate::routing::Consistency;
    use crate::test_util::{node_config, StubConnector};

    fn test_config() -> Config {
        let mut config = Config::default();
        config.cluster.primary = node_config("primary");
        config.cluster.replicas = vec![node_config("replica-a"), node_config("replica-b")];
        config
    }

    #[tokio::test]
    async fn test_connect_wires_the_engine() {
        let connector = StubConnector::new();
        let engine = Relevo::connect(&test_config(), &connector).await.unwrap();

        assert_eq!(engine.cluster().primary().await.id(), &NodeId::new("primary"));
        assert_eq!(engine.cluster().replicas().await.len(), 2);

        let writer = engine.router().route_write(None).await;
        assert_eq!(writer.id(), &NodeId::new("primary"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let mut config = test_config();
        config.health.failure_threshold = 0;

        let connector = StubConnector::new();
        let result = Relevo::connect(&config, &connector).await;
        assert!(matches!(result, Err(RelevoError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_surfaces_offending_node() {
        let connector = StubConnector::failing_on("replica-b");
        let result = Relevo::connect(&test_config(), &connector).await;

        match result {
            Err(RelevoError::Connection { node, .. }) => assert_eq!(node, "replica-b"),
            other => panic!("expected connection error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_start_stop_shutdown() {
        let connector = StubConnector::new();
        let mut config = test_config();
        config.health.interval_sec = 1;
        config.lag.interval_sec = 1;

        let engine = Relevo::connect(&config, &connector).await.unwrap();
        engine.start().await;

        // Reads route somewhere sensible while the monitors warm up
        let reader = engine.router().route_read(Consistency::Eventual, None).await;
        assert!(!reader.id().as_str().is_empty());

        engine.shutdown().await.unwrap();
        assert!(connector.opened().iter().all(|h| h.was_closed()));

        // Stop after shutdown is a no-op
        engine.stop().await;
    }
}
