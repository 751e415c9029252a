//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, feature counts ordered)
//! - Check addresses parse before anything binds them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem, with the dotted path of the offending field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
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

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new("limits.max_body_size", "must be greater than 0"));
    }

    let features = &config.features;
    if features.default_features == 0 {
        errors.push(ValidationError::new("features.default_features", "must be greater than 0"));
    }
    if features.default_features > features.max_features {
        errors.push(ValidationError::new(
            "features.default_features",
            format!("exceeds features.max_features ({})", features.max_features),
        ));
    }

    if !config.encoding.eq_ignore_ascii_case("utf-8") && !config.encoding.eq_ignore_ascii_case("utf8") {
        errors.push(ValidationError::new(
            "encoding",
            format!("unsupported encoding {}, only utf-8 is available", config.encoding),
        ));
    }

    if config.auth.api_key.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::new("auth.api_key", "must not be empty when set"));
    }
    if config.auth.realm.contains('"') {
        errors.push(ValidationError::new("auth.realm", "must not contain quotes"));
    }

    if let Some(endpoints) = &config.endpoints {
        for name in endpoints.keys() {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphabetic()) {
                errors.push(ValidationError::new(
                    "endpoints",
                    format!("endpoint names are letters only: {:?}", name),
                ));
            }
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("not a socket address: {}", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
