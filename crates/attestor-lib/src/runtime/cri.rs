//! CRI client over the runtime's local socket

use super::{ContainerRuntime, RuntimeContainer};
use crate::error::{AttestationError, Result};
use crate::proto::runtime::v1::{ContainerFilter, ContainerStatusRequest, ListContainersRequest};
use crate::proto::RuntimeServiceClient;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

pub const DEFAULT_RUNTIME_ENDPOINT: &str = "/run/containerd/containerd.sock";

/// Container runtime reached through its CRI gRPC socket
#[derive(Debug, Clone)]
pub struct CriRuntime {
    socket_path: PathBuf,
    channel: Channel,
}

impl CriRuntime {
    /// Create a client for the runtime socket.
    ///
    /// The connection is established on first use.
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        let socket_path = socket_path.into();
        let connect_path = socket_path.clone();

        // The URI is ignored by the connector; tonic only needs a valid authority.
        let channel = Endpoint::from_static("http://[::]:50051")
            .timeout(timeout)
            .connect_timeout(timeout)
            .connect_with_connector_lazy(service_fn(move |_: Uri| {
                UnixStream::connect(connect_path.clone())
            }));

        Self {
            socket_path,
            channel,
        }
    }

    fn client(&self) -> RuntimeServiceClient<Channel> {
        RuntimeServiceClient::new(self.channel.clone())
    }
}

#[async_trait]
impl ContainerRuntime for CriRuntime {
    async fn list_containers(&self) -> Result<Vec<RuntimeContainer>> {
        let request = ListContainersRequest {
            filter: Some(ContainerFilter::default()),
        };

        let response = self
            .client()
            .list_containers(request)
            .await
            .map_err(|status| {
                AttestationError::RuntimeUnavailable(format!(
                    "failed to list containers via {}: {}",
                    self.socket_path.display(),
                    status.message()
                ))
            })?
            .into_inner();

        debug!(count = response.containers.len(), "Listed runtime containers");

        Ok(response
            .containers
            .into_iter()
            .map(|c| RuntimeContainer {
                name: c.metadata.map(|m| m.name).unwrap_or_default(),
                id: c.id,
                pod_sandbox_id: c.pod_sandbox_id,
            })
            .collect())
    }

    async fn container_info(&self, container_id: &str) -> Result<HashMap<String, String>> {
        let request = ContainerStatusRequest {
            container_id: container_id.to_string(),
            verbose: true,
        };

        let response = self
            .client()
            .container_status(request)
            .await
            .map_err(|status| {
                AttestationError::RuntimeUnavailable(format!(
                    "failed to get status of container {}: {}",
                    container_id,
                    status.message()
                ))
            })?;

        Ok(response.into_inner().info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_socket_is_runtime_unavailable() {
        let dir = TempDir::new().unwrap();
        let runtime = CriRuntime::new(dir.path().join("absent.sock"), Duration::from_millis(500));

        let err = runtime.list_containers().await.unwrap_err();
        assert!(matches!(err, AttestationError::RuntimeUnavailable(_)));
    }
}
