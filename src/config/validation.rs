//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that the endpoint resolves to a publishable address
//! - Validate value ranges and formats
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - The report interval is never rejected; the reporter raises it to the floor

use std::net::SocketAddr;

use tracing::level_filters::LevelFilter;

use crate::config::schema::ServiceConfig;
use crate::net::address::{resolve_from_config, InstanceIdentity, Protocol};

/// A single semantic problem in a configuration.
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

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let identity = InstanceIdentity::from_config(&config.instance);
    match resolve_from_config(&config.endpoint, &config.node, &identity) {
        Ok(endpoint) => {
            if endpoint.protocol() == Protocol::Https && config.endpoint.tls.is_none() {
                errors.push(ValidationError::new("endpoint.tls", "required for https endpoints"));
            }
        }
        Err(e) => errors.push(ValidationError::new("endpoint", e.to_string())),
    }

    if config.health.source_id.trim().is_empty() {
        errors.push(ValidationError::new("health.source_id", "must not be empty"));
    }
    if config.health.property.trim().is_empty() {
        errors.push(ValidationError::new("health.property", "must not be empty"));
    }

    if config.rollback.enabled && config.rollback.upgrade_domains.is_empty() {
        errors.push(ValidationError::new(
            "rollback.upgrade_domains",
            "must list at least one domain when rollback is enabled",
        ));
    }

    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }

    if config.observability.log_level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level `{}`", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
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
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServiceConfig::default();
        config.endpoint.port = 0;
        config.health.source_id = String::new();
        config.http.request_timeout_secs = 0;
        config.observability.log_level = "loud".into();
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "endpoint",
                "health.source_id",
                "http.request_timeout_secs",
                "observability.log_level",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn https_requires_tls() {
        let mut config = ServiceConfig::default();
        config.endpoint.protocol = "https".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "endpoint.tls");

        config.endpoint.tls = Some(TlsConfig {
            cert_path: "cert.pem".into(),
            key_path: "key.pem".into(),
        });
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn empty_node_address_is_rejected() {
        let mut config = ServiceConfig::default();
        config.node.address = String::new();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("node address is empty"));
    }

    #[test]
    fn low_interval_is_accepted() {
        let mut config = ServiceConfig::default();
        config.health.interval_secs = 5;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn rollback_needs_domains() {
        let mut config = ServiceConfig::default();
        config.rollback.enabled = true;
        config.rollback.upgrade_domains.clear();
        assert_eq!(validate_config(&config).unwrap_err()[0].field, "rollback.upgrade_domains");
    }
}
