//! Configuration management for relevo

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main relevo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster topology configuration
    pub cluster: ClusterConfig,
    /// Health monitoring configuration
    pub health: HealthConfig,
    /// Replication lag detection configuration
    pub lag: LagConfig,
    /// Read routing configuration
    pub routing: RoutingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Cluster topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// The node accepting writes at startup
    pub primary: NodeConfig,
    /// Read replicas mirroring the primary
    pub replicas: Vec<NodeConfig>,
}

/// A single database node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Stable node identity, used as a map key everywhere
    pub id: String,
    /// Connection string handed to the database connector, opaque to the engine
    pub dsn: String,
}

/// Health check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Health check interval in seconds
    pub interval_sec: u64,
    /// Per-probe timeout in seconds
    pub timeout_sec: u64,
    /// Consecutive primary failures before failover may trigger
    pub failure_threshold: u32,
}

/// Replication lag detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagConfig {
    /// Lag measurement interval in seconds
    pub interval_sec: u64,
    /// Per-probe timeout in seconds
    pub timeout_sec: u64,
    /// Replication position ticks applied per second; converts a position
    /// delta into an estimated lag duration
    pub positions_per_sec: u64,
}

/// Read routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Selection algorithm for replica reads
    pub strategy: StrategyConfig,
    /// Maximum acceptable replica lag for reads, in milliseconds
    pub max_replica_lag_ms: u64,
    /// Sticky-to-primary window after a session write, in seconds
    pub session_sticky_sec: u64,
}

/// Selection algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum StrategyConfig {
    #[serde(rename = "round_robin")]
    RoundRobin,
    #[serde(rename = "weighted")]
    Weighted {
        /// One weight per replica slot, in replica declaration order
        weights: Vec<u32>,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig {
                primary: NodeConfig {
                    id: "primary".to_string(),
                    dsn: "postgres://127.0.0.1:5432/app".to_string(),
                },
                replicas: vec![
                    NodeConfig {
                        id: "replica-0".to_string(),
                        dsn: "postgres://127.0.0.1:5433/app".to_string(),
                    },
                    NodeConfig {
                        id: "replica-1".to_string(),
                        dsn: "postgres://127.0.0.1:5434/app".to_string(),
                    },
                ],
            },
            health: HealthConfig {
                interval_sec: 10,
                timeout_sec: 5,
                failure_threshold: 3,
            },
            lag: LagConfig {
                interval_sec: 5,
                timeout_sec: 3,
                positions_per_sec: 1000,
            },
            routing: RoutingConfig {
                strategy: StrategyConfig::RoundRobin,
                max_replica_lag_ms: 200,
                session_sticky_sec: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate cluster topology
        let mut seen_ids = std::collections::HashSet::new();
        for node in std::iter::once(&self.cluster.primary).chain(self.cluster.replicas.iter()) {
            if node.id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "node id cannot be empty".to_string(),
                ));
            }
            if node.dsn.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "node '{}' has an empty dsn",
                    node.id
                )));
            }
            if !seen_ids.insert(node.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }

        // Validate health config
        if self.health.interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health interval_sec must be greater than 0".to_string(),
            ));
        }
        if self.health.timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health timeout_sec must be greater than 0".to_string(),
            ));
        }
        if self.health.timeout_sec >= self.health.interval_sec {
            return Err(ConfigError::ValidationError(
                "health timeout_sec must be less than interval_sec".to_string(),
            ));
        }
        if self.health.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "health failure_threshold must be greater than 0".to_string(),
            ));
        }

        // Validate lag config
        if self.lag.interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "lag interval_sec must be greater than 0".to_string(),
            ));
        }
        if self.lag.timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "lag timeout_sec must be greater than 0".to_string(),
            ));
        }
        if self.lag.timeout_sec >= self.lag.interval_sec {
            return Err(ConfigError::ValidationError(
                "lag timeout_sec must be less than interval_sec".to_string(),
            ));
        }
        if self.lag.positions_per_sec == 0 {
            return Err(ConfigError::ValidationError(
                "lag positions_per_sec must be greater than 0".to_string(),
            ));
        }

        // Validate routing config
        if self.routing.max_replica_lag_ms == 0 {
            return Err(ConfigError::ValidationError(
                "routing max_replica_lag_ms must be greater than 0".to_string(),
            ));
        }
        if self.routing.session_sticky_sec == 0 {
            return Err(ConfigError::ValidationError(
                "routing session_sticky_sec must be greater than 0".to_string(),
            ));
        }
        if let StrategyConfig::Weighted { weights } = &self.routing.strategy {
            if weights.is_empty() {
                return Err(ConfigError::ValidationError(
                    "weighted strategy requires at least one weight".to_string(),
                ));
            }
            if weights.iter().all(|w| *w == 0) {
                return Err(ConfigError::ValidationError(
                    "weighted strategy requires at least one non-zero weight".to_string(),
                ));
            }
        }

        // Validate logging config
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            cluster: ClusterConfig {
                primary: NodeConfig {
                    id: "primary".to_string(),
                    dsn: "postgres://10.0.1.10:5432/app".to_string(),
                },
                replicas: vec![
                    NodeConfig {
                        id: "replica-0".to_string(),
                        dsn: "postgres://10.0.1.11:5432/app".to_string(),
                    },
                    NodeConfig {
                        id: "replica-1".to_string(),
                        dsn: "postgres://10.0.1.12:5432/app".to_string(),
                    },
                ],
            },
            ..Default::default()
        };

        config.save_to_file(path)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
