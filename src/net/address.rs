//! Endpoint address derivation.
//!
//! # Responsibilities
//! - Build the bind address (wildcard host) and the publish address (node host)
//!   from protocol, port and partition/replica identity
//! - Reject endpoint configuration that cannot produce a usable address
//!
//! # Address Format
//! ```text
//! bind:    {protocol}://+:{port}/{partition_id}/{replica_id}/
//! publish: {protocol}://{node_address}:{port}/{partition_id}/{replica_id}/
//! ```
//!
//! # Design Decisions
//! - Pure: resolving never touches a socket
//! - Both addresses share the same path suffix; only the host differs

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use crate::config::schema::{EndpointConfig, InstanceConfig, NodeConfig};
use crate::health::report::ReportTarget;

/// Host token meaning "all local interfaces".
pub const WILDCARD_HOST: &str = "+";

/// Characters that cannot appear in a node address.
const FORBIDDEN_HOST_CHARS: &[char] = &['/', '?', '#', '@', '\\', ' ', '+'];

/// Error type for endpoint configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("port {0} is outside 1..=65535")]
    InvalidPort(u32),
    #[error("unsupported endpoint protocol `{0}`")]
    UnsupportedProtocol(String),
    #[error("node address is empty")]
    EmptyNodeAddress,
    #[error("node address `{0}` is not a valid host")]
    InvalidNodeAddress(String),
    #[error("publish address `{address}` is not a valid URI: {source}")]
    InvalidUri {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("https endpoints require [endpoint.tls]")]
    MissingTls,
    #[error("failed to load TLS material: {0}")]
    TlsMaterial(#[source] std::io::Error),
}

/// Identity of this service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InstanceIdentity {
    pub process_id: u32,
    pub replica_id: u64,
    pub partition_id: Uuid,
}

impl InstanceIdentity {
    /// Identity of the current process for the given partition and replica.
    pub fn new(partition_id: Uuid, replica_id: u64) -> Self {
        Self {
            process_id: std::process::id(),
            replica_id,
            partition_id,
        }
    }

    pub fn from_config(config: &InstanceConfig) -> Self {
        Self::new(config.partition_id, config.replica_id)
    }

    /// Key health and load reports are filed under.
    pub fn target(&self) -> ReportTarget {
        ReportTarget {
            partition_id: self.partition_id,
            replica_id: self.replica_id,
        }
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.process_id, self.replica_id)
    }
}

/// Endpoint scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl FromStr for Protocol {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(ConfigurationError::UnsupportedProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

/// Host the listener binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindHost {
    Wildcard,
    Explicit(IpAddr),
}

impl BindHost {
    pub fn ip(&self) -> IpAddr {
        match self {
            BindHost::Wildcard => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            BindHost::Explicit(ip) => *ip,
        }
    }
}

impl fmt::Display for BindHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindHost::Wildcard => f.write_str(WILDCARD_HOST),
            BindHost::Explicit(IpAddr::V6(ip)) => write!(f, "[{}]", ip),
            BindHost::Explicit(ip) => write!(f, "{}", ip),
        }
    }
}

/// A resolved endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    protocol: Protocol,
    port: u16,
    bind_host: BindHost,
    publish_host: String,
    partition_id: Uuid,
    replica_id: u64,
}

impl Endpoint {
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bind_host(&self) -> BindHost {
        self.bind_host
    }

    pub fn publish_host(&self) -> &str {
        &self.publish_host
    }

    /// `{partition_id}/{replica_id}/`, shared by both addresses.
    pub fn path_suffix(&self) -> String {
        format!("{}/{}/", self.partition_id, self.replica_id)
    }

    /// Address the listener is registered under locally.
    pub fn bind_address(&self) -> String {
        self.format_with_host(&self.bind_host.to_string())
    }

    /// Address published for discovery by remote clients.
    pub fn publish_address(&self) -> String {
        self.format_with_host(&self.publish_host)
    }

    /// Socket address to hand to the binder.
    pub fn bind_socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host.ip(), self.port)
    }

    /// Bind to a specific local IP instead of all interfaces.
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_host = BindHost::Explicit(ip);
        self
    }

    fn format_with_host(&self, host: &str) -> String {
        format!("{}://{}:{}/{}", self.protocol, host, self.port, self.path_suffix())
    }
}

/// Derive bind and publish addresses for an instance.
pub fn resolve(
    protocol: &str,
    port: u32,
    partition_id: Uuid,
    replica_id: u64,
    node_address: &str,
) -> Result<Endpoint, ConfigurationError> {
    let protocol: Protocol = protocol.parse()?;
    let port = u16::try_from(port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(ConfigurationError::InvalidPort(port))?;
    let publish_host = publish_host(node_address)?;

    let endpoint = Endpoint {
        protocol,
        port,
        bind_host: BindHost::Wildcard,
        publish_host,
        partition_id,
        replica_id,
    };

    let address = endpoint.publish_address();
    url::Url::parse(&address).map_err(|source| ConfigurationError::InvalidUri {
        address: address.clone(),
        source,
    })?;

    Ok(endpoint)
}

/// Resolve the endpoint described by configuration for `identity`.
pub fn resolve_from_config(
    endpoint: &EndpointConfig,
    node: &NodeConfig,
    identity: &InstanceIdentity,
) -> Result<Endpoint, ConfigurationError> {
    let resolved = resolve(
        &endpoint.protocol,
        endpoint.port,
        identity.partition_id,
        identity.replica_id,
        &node.address,
    )?;
    Ok(match endpoint.bind_ip {
        Some(ip) => resolved.with_bind_ip(ip),
        None => resolved,
    })
}

fn publish_host(node_address: &str) -> Result<String, ConfigurationError> {
    let host = node_address.trim();
    if host.is_empty() {
        return Err(ConfigurationError::EmptyNodeAddress);
    }
    if let Ok(ip) = host.parse::<Ipv6Addr>() {
        return Ok(format!("[{}]", ip));
    }
    if host.contains(FORBIDDEN_HOST_CHARS) || host.contains(':') {
        return Err(ConfigurationError::InvalidNodeAddress(node_address.to_string()));
    }
    Ok(host.to_string())
}
