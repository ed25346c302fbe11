//! Cluster gateway implementations.
//!
//! `KubectlGateway` shells out to kubectl for real clusters;
//! `MemoryCluster` is a deterministic in-memory stand-in used by tests
//! and the clusterless dev mode (`cluster.mode = "memory"`).

pub mod kubectl;
pub mod memory;

use std::sync::Arc;

use remedy_common::{ClusterConfig, ClusterGateway};

pub use kubectl::KubectlGateway;
pub use memory::MemoryCluster;

/// Build the gateway selected by configuration.
pub fn from_config(config: &ClusterConfig) -> Arc<dyn ClusterGateway> {
    match config.mode.as_str() {
        "memory" => Arc::new(MemoryCluster::new()),
        _ => Arc::new(KubectlGateway::new(&config.kubectl_bin)),
    }
}
