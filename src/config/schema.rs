//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::health::reporter::DEFAULT_REPORT_INTERVAL_SECS;

/// Root configuration for a service instance.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Hosting node identity.
    pub node: NodeConfig,

    /// Partition and replica this instance serves.
    pub instance: InstanceConfig,

    /// Endpoint the instance listens on and publishes.
    pub endpoint: EndpointConfig,

    /// Health and load reporting.
    pub health: HealthConfig,

    /// Rollback policy used during staged upgrades.
    pub rollback: RollbackConfig,

    /// HTTP handler settings.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Hosting node identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name, used in logs.
    pub name: String,

    /// Routable IP address or FQDN of the node; replaces the wildcard host
    /// in the published address.
    pub address: String,

    /// Upgrade domain the node belongs to.
    pub upgrade_domain: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node-0".to_string(),
            address: "127.0.0.1".to_string(),
            upgrade_domain: "0".to_string(),
        }
    }
}

/// Partition and replica identity.
///
/// Omitted ids are generated at load time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub partition_id: Uuid,
    pub replica_id: u64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            partition_id: Uuid::new_v4(),
            replica_id: (Uuid::new_v4().as_u128() as u64) >> 1,
        }
    }
}

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Endpoint name, used in logs.
    pub name: String,

    /// Scheme: `http` or `https`.
    pub protocol: String,

    /// Port to bind and publish.
    pub port: u32,

    /// Bind to this IP instead of all interfaces.
    pub bind_ip: Option<IpAddr>,

    /// TLS material, required for `https`.
    pub tls: Option<TlsConfig>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: "ServiceEndpoint".to_string(),
            protocol: "http".to_string(),
            port: 8080,
            bind_ip: None,
            tls: None,
        }
    }
}

/// TLS configuration for the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Health reporting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Reporting interval in seconds. Values below 30 are raised to 30.
    pub interval_secs: u64,

    /// Source id stamped on health reports.
    pub source_id: String,

    /// Health property reported on.
    pub property: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REPORT_INTERVAL_SECS,
            source_id: "ServiceHealth".to_string(),
            property: "Heartbeat".to_string(),
        }
    }
}

/// Rollback policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RollbackConfig {
    /// Emit a failing health report on listed upgrade domains.
    pub enabled: bool,

    /// Upgrade domains that report failure while enabled.
    pub upgrade_domains: Vec<String>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            upgrade_domains: vec!["2".to_string(), "3".to_string(), "4".to_string()],
        }
    }
}

/// HTTP handler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Directory `index.html` is served from.
    pub content_dir: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            content_dir: PathBuf::from("wwwroot"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: ServiceConfig = toml::from_str("[health]\ninterval_secs = 45\n").unwrap();

        assert_eq!(config.health.interval_secs, 45);
        assert_eq!(config.health.source_id, "ServiceHealth");
        assert_eq!(config.endpoint.protocol, "http");
        assert_eq!(config.endpoint.port, 8080);
        assert_eq!(config.endpoint.bind_ip, None);
        assert!(!config.rollback.enabled);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn full_file_parses() {
        let text = r#"
            [node]
            name = "node-3"
            address = "10.0.0.7"
            upgrade_domain = "3"

            [instance]
            partition_id = "5f1c2d3e-0000-4000-8000-00000000abcd"
            replica_id = 131

            [endpoint]
            protocol = "https"
            port = 8443
            bind_ip = "127.0.0.1"

            [endpoint.tls]
            cert_path = "cert.pem"
            key_path = "key.pem"

            [rollback]
            enabled = true
            upgrade_domains = ["3"]

            [observability]
            log_format = "json"
            metrics_enabled = false
        "#;
        let config: ServiceConfig = toml::from_str(text).unwrap();

        assert_eq!(config.node.upgrade_domain, "3");
        assert_eq!(config.instance.replica_id, 131);
        assert_eq!(
            config.instance.partition_id,
            Uuid::parse_str("5f1c2d3e-0000-4000-8000-00000000abcd").unwrap()
        );
        assert_eq!(config.endpoint.bind_ip, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(config.endpoint.tls.unwrap().cert_path, PathBuf::from("cert.pem"));
        assert_eq!(config.rollback.upgrade_domains, vec!["3".to_string()]);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn generated_replica_ids_are_positive_as_i64() {
        let config = InstanceConfig::default();
        assert!(i64::try_from(config.replica_id).is_ok());
    }
}
