//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the replica set is non-empty with unique ids and valid weights
//! - Validate the ingest queue pattern and retry/timeout ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatcherConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, at startup and on reload

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::DispatcherConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Config field the error refers to.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn error(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a configuration, collecting every failure.
pub fn validate_config(config: &DispatcherConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.replicas.is_empty() {
        errors.push(error("replicas", "at least one replica must be configured"));
    }

    let mut seen = HashSet::new();
    for replica in &config.replicas {
        if replica.id.trim().is_empty() {
            errors.push(error("replicas.id", "replica id must not be empty"));
        }
        if !seen.insert(replica.id.as_str()) {
            errors.push(error(
                "replicas.id",
                format!("duplicate replica id '{}'", replica.id),
            ));
        }
        if replica.weight == 0 {
            errors.push(error(
                "replicas.weight",
                format!("replica '{}' weight must be >= 1", replica.id),
            ));
        }
    }

    if !config.dispatch.ingest_queue_pattern.contains("{replica}") {
        errors.push(error(
            "dispatch.ingest_queue_pattern",
            "pattern must contain the '{replica}' placeholder",
        ));
    }

    if config.dispatch.central_queue.trim().is_empty() {
        errors.push(error("dispatch.central_queue", "must not be empty"));
    }

    if config.dispatch.dead_letter_queue.trim().is_empty() {
        errors.push(error("dispatch.dead_letter_queue", "must not be empty"));
    }

    match config.dispatch.exchange_type.as_str() {
        "direct" | "fanout" => {}
        other => errors.push(error(
            "dispatch.exchange_type",
            format!("unsupported exchange type '{}'", other),
        )),
    }

    if config.broker.prefetch == 0 {
        errors.push(error("broker.prefetch", "must be >= 1"));
    }

    if config.broker.confirm_timeout_ms == 0 {
        errors.push(error("broker.confirm_timeout_ms", "must be >= 1"));
    }

    if config.retry.max_attempts == 0 {
        errors.push(error("retry.max_attempts", "must be >= 1"));
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(error(
            "retry.base_delay_ms",
            "must not exceed retry.max_delay_ms",
        ));
    }

    if config.consistent_hash.replication_factor == 0 {
        errors.push(error("consistent_hash.replication_factor", "must be >= 1"));
    }

    if config.load_report.enabled && config.load_report.interval_secs == 0 {
        errors.push(error("load_report.interval_secs", "must be >= 1"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ReplicaConfig;

    fn config_with_replicas(ids: &[&str]) -> DispatcherConfig {
        let mut config = DispatcherConfig::default();
        config.replicas = ids
            .iter()
            .map(|id| ReplicaConfig {
                id: id.to_string(),
                weight: 1,
            })
            .collect();
        config
    }

    #[test]
    fn test_empty_replica_set_rejected() {
        let config = DispatcherConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "replicas"));
    }

    #[test]
    fn test_valid_config_accepted() {
        let config = config_with_replicas(&["a", "b"]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_ids_and_zero_weight_collected_together() {
        let mut config = config_with_replicas(&["a", "a"]);
        config.replicas[1].weight = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        assert!(errors.iter().any(|e| e.field == "replicas.weight"));
    }

    #[test]
    fn test_pattern_without_placeholder_rejected() {
        let mut config = config_with_replicas(&["a"]);
        config.dispatch.ingest_queue_pattern = "telemetry.ingest".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.field == "dispatch.ingest_queue_pattern"));
    }
}
