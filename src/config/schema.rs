//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! dispatcher. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the telemetry dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Broker connection parameters.
    pub broker: BrokerConfig,

    /// Dispatch queue/exchange topology and strategy selection.
    pub dispatch: DispatchConfig,

    /// Replica definitions.
    pub replicas: Vec<ReplicaConfig>,

    /// Retry / dead-letter configuration.
    pub retry: RetryConfig,

    /// Load reporting configuration.
    pub load_report: LoadReportConfig,

    /// Consistent-hash strategy tuning.
    pub consistent_hash: ConsistentHashConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Broker connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker URI (e.g., "amqp://localhost:5672").
    pub uri: String,

    /// Maximum concurrent in-flight dispatches (prefetch window).
    pub prefetch: usize,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Publish-confirm wait timeout in milliseconds.
    pub confirm_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            uri: "amqp://localhost:5672".to_string(),
            prefetch: 16,
            connect_timeout_secs: 5,
            confirm_timeout_ms: 2000,
        }
    }
}

/// Selection strategy, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum StrategyKind {
    #[default]
    ConsistentHashing,
    LoadBased,
    WeightedRoundRobin,
}

/// Queue topology and strategy selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Selection strategy name.
    pub strategy: StrategyKind,

    /// Central ingress queue consumed by the dispatch loop.
    pub central_queue: String,

    /// Per-replica ingest queue name pattern; `{replica}` is substituted
    /// with the replica id.
    pub ingest_queue_pattern: String,

    /// Exchange the dispatcher publishes to.
    pub exchange_name: String,

    /// Exchange type ("direct", "fanout").
    pub exchange_type: String,

    /// Terminal queue for messages that exhaust retries or carry no
    /// routing key.
    pub dead_letter_queue: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::ConsistentHashing,
            central_queue: "telemetry.ingress".to_string(),
            ingest_queue_pattern: "telemetry.ingest.{replica}".to_string(),
            exchange_name: "telemetry.dispatch".to_string(),
            exchange_type: "direct".to_string(),
            dead_letter_queue: "telemetry.dead-letter".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Resolve the ingest queue name for a replica id.
    pub fn ingest_queue_for(&self, replica_id: &str) -> String {
        self.ingest_queue_pattern.replace("{replica}", replica_id)
    }
}

/// A single replica definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplicaConfig {
    /// Unique replica identifier.
    pub id: String,

    /// Weight for weighted round-robin (default: 1).
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum delivery attempts before dead-lettering.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

/// Load reporting configuration for the load-based strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadReportConfig {
    /// Enable the periodic queue-depth poll.
    pub enabled: bool,

    /// Poll interval in seconds.
    pub interval_secs: u64,
}

impl Default for LoadReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
        }
    }
}

/// Consistent-hash strategy tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsistentHashConfig {
    /// Virtual nodes per replica on the hash ring.
    pub replication_factor: u32,
}

impl Default for ConsistentHashConfig {
    fn default() -> Self {
        Self {
            replication_factor: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_queue_substitution() {
        let config = DispatchConfig::default();
        assert_eq!(
            config.ingest_queue_for("replica-7"),
            "telemetry.ingest.replica-7"
        );
    }

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: DispatcherConfig = toml::from_str(
            r#"
            [dispatch]
            strategy = "WeightedRoundRobin"

            [[replicas]]
            id = "a"
            weight = 2

            [[replicas]]
            id = "b"
            "#,
        )
        .unwrap();

        assert_eq!(config.dispatch.strategy, StrategyKind::WeightedRoundRobin);
        assert_eq!(config.replicas.len(), 2);
        assert_eq!(config.replicas[0].weight, 2);
        assert_eq!(config.replicas[1].weight, 1);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: Result<DispatcherConfig, _> = toml::from_str(
            r#"
            [dispatch]
            strategy = "RandomPick"
            "#,
        );
        assert!(result.is_err());
    }
}
