//! Container runtime lookup
//!
//! Maps a process id to the container whose runtime-reported main process
//! it is. Runtimes offer no pid index, so every container is inspected.

mod cri;
mod resolver;

pub use cri::{CriRuntime, DEFAULT_RUNTIME_ENDPOINT};
pub use resolver::{ContainerResolver, RuntimeInfo, RUNTIME_INFO_KEY};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// A container as listed by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContainer {
    pub id: String,
    pub pod_sandbox_id: String,
    pub name: String,
}

/// Read-only view of the local container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List every container known to the runtime, unfiltered
    async fn list_containers(&self) -> Result<Vec<RuntimeContainer>>;

    /// Verbose status information for one container
    async fn container_info(&self, container_id: &str) -> Result<HashMap<String, String>>;
}
