//! Process id to container resolution

use super::ContainerRuntime;
use crate::error::{AttestationError, Result};
use crate::models::ContainerRecord;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key of the runtime-specific JSON blob in verbose container status
pub const RUNTIME_INFO_KEY: &str = "info";

/// Fields of the runtime info blob used for pid matching and diagnostics
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub pid: u32,
    #[serde(default, rename = "sandboxID")]
    pub sandbox_id: String,
    #[serde(default)]
    pub runtime_type: String,
    #[serde(default)]
    pub snapshotter: String,
    #[serde(default)]
    pub removing: bool,
}

/// Resolves a pid to exactly one running container
#[derive(Clone)]
pub struct ContainerResolver {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerResolver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Find the container whose reported main process is `pid`.
    ///
    /// Containers whose status or info blob cannot be read are skipped. More
    /// than one match fails closed.
    pub async fn resolve(&self, pid: u32) -> Result<ContainerRecord> {
        let containers = self.runtime.list_containers().await?;
        let scanned = containers.len();
        let mut matches = Vec::new();

        for container in containers {
            let info = match self.runtime.container_info(&container.id).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(container_id = %container.id, error = %e, "Failed to get container status");
                    continue;
                }
            };

            let Some(blob) = info.get(RUNTIME_INFO_KEY) else {
                warn!(container_id = %container.id, "Container status carries no runtime info");
                continue;
            };

            let parsed: RuntimeInfo = match serde_json::from_str(blob) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(container_id = %container.id, error = %e, "Failed to parse runtime info");
                    continue;
                }
            };

            if parsed.pid != pid {
                continue;
            }

            let workload_group_id = if container.pod_sandbox_id.is_empty() {
                parsed.sandbox_id.clone()
            } else {
                container.pod_sandbox_id.clone()
            };

            matches.push(ContainerRecord {
                container_id: container.id,
                workload_group_id,
                reported_process_id: parsed.pid,
                runtime_metadata: blob.clone(),
            });
        }

        debug!(pid, scanned, matched = matches.len(), "Scanned runtime containers");

        match matches.len() {
            0 => Err(AttestationError::ContainerNotFound { pid }),
            1 => Ok(matches.remove(0)),
            _ => Err(AttestationError::AmbiguousContainer {
                pid,
                candidates: matches,
            }),
        }
    }
}
