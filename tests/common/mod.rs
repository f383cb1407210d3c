//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;

use service_host::health::{HealthStore, LoadStore};
use service_host::{ServiceConfig, ServiceInstance};
use uuid::Uuid;

pub const PARTITION: &str = "5f1c2d3e-0000-4000-8000-00000000abcd";
pub const REPLICA: u64 = 131;

/// Find a port that is free right now on the loopback interface.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Configuration bound to loopback on `port`, publishing as `node_address`.
pub fn test_config(port: u16, node_address: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.node.address = node_address.to_string();
    config.instance.partition_id = Uuid::parse_str(PARTITION).unwrap();
    config.instance.replica_id = REPLICA;
    config.endpoint.port = u32::from(port);
    config.endpoint.bind_ip = Some("127.0.0.1".parse().unwrap());
    config.observability.metrics_enabled = false;
    config
}

/// An instance whose sinks the test can inspect.
pub fn observed_instance(config: ServiceConfig) -> (ServiceInstance, Arc<HealthStore>, Arc<LoadStore>) {
    let health = Arc::new(HealthStore::new());
    let load = Arc::new(LoadStore::new());
    let instance = ServiceInstance::new(config)
        .with_health_sink(health.clone())
        .with_load_sink(load.clone());
    (instance, health, load)
}
