//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, attempts > 0, chunk size > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::MonitorConfig;

const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let store = &config.store;
    let probe = &config.probe;

    if store.data_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("store.data_path", "must not be empty"));
    }

    let intervals = [
        ("store.flush_interval_secs", store.flush_interval_secs),
        ("store.external_poll_secs", store.external_poll_secs),
        ("store.priority_sweep_secs", store.priority_sweep_secs),
        ("store.priority_ttl_secs", store.priority_ttl_secs),
        ("probe.base_interval_secs", probe.base_interval_secs),
        ("probe.priority_interval_secs", probe.priority_interval_secs),
        ("probe.failure_cooldown_secs", probe.failure_cooldown_secs),
        ("probe.normal_timeout_ms", probe.normal_timeout_ms),
        ("probe.priority_timeout_ms", probe.priority_timeout_ms),
    ];
    for (field, value) in intervals {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if probe.normal_attempts == 0 {
        errors.push(ValidationError::new("probe.normal_attempts", "must be at least 1"));
    }
    if probe.priority_attempts == 0 {
        errors.push(ValidationError::new("probe.priority_attempts", "must be at least 1"));
    }
    if probe.chunk_size == 0 {
        errors.push(ValidationError::new("probe.chunk_size", "must be at least 1"));
    }
    if probe.max_workers == Some(0) {
        errors.push(ValidationError::new("probe.max_workers", "must be at least 1"));
    }
    if probe.trigger_capacity == 0 {
        errors.push(ValidationError::new("probe.trigger_capacity", "must be at least 1"));
    }
    if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&probe.backoff_multiplier) {
        errors.push(ValidationError::new(
            "probe.backoff_multiplier",
            format!(
                "must be between 1.0 and {MAX_BACKOFF_MULTIPLIER}, got {}",
                probe.backoff_multiplier
            ),
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
