//! Node-local workload directory (kubelet)
//!
//! Lists the pods scheduled on this node. Results are never cached: pod
//! membership changes faster than any safe cache TTL.

mod client;

pub use client::{
    DirectoryConfig, KubeletClient, CONTAINER_MOUNT_POINT_ENV, DEFAULT_KUBELET_CA_PATH,
    DEFAULT_KUBELET_PORT, DEFAULT_TOKEN_PATH, NODE_NAME_ENV,
};

use crate::error::Result;
use crate::models::Pod;
use async_trait::async_trait;

#[async_trait]
pub trait WorkloadDirectory: Send + Sync {
    /// Fetch the current pod listing, in the order the directory returns it
    async fn list_workloads(&self) -> Result<Vec<Pod>>;
}
