//! Workload API client over the local socket

use crate::proto::workload::{
    SpiffeWorkloadApiClient, X509svidRequest, X509svidResponse, SECURITY_HEADER,
};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint, Uri};
use tonic::Request;
use tower::service_fn;
use tracing::debug;

/// Client for a Workload API served on a Unix socket
#[derive(Debug, Clone)]
pub struct WorkloadApiClient {
    inner: SpiffeWorkloadApiClient<Channel>,
    timeout: Duration,
}

impl WorkloadApiClient {
    /// Connect to the socket; fails if nothing is listening
    pub async fn connect(socket_path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let socket_path = socket_path.into();
        let connect_path = socket_path.clone();

        let channel = Endpoint::from_static("http://[::]:50051")
            .connect_timeout(timeout)
            .connect_with_connector(service_fn(move |_: Uri| {
                UnixStream::connect(connect_path.clone())
            }))
            .await
            .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;

        debug!(socket = %socket_path.display(), "Connected to Workload API");

        Ok(Self {
            inner: SpiffeWorkloadApiClient::new(channel),
            timeout,
        })
    }

    /// Fetch the first X.509 SVID response for the calling process
    pub async fn fetch_x509svid(&mut self) -> Result<X509svidResponse> {
        let mut request = Request::new(X509svidRequest {});
        request
            .metadata_mut()
            .insert(SECURITY_HEADER, MetadataValue::from_static("true"));
        request.set_timeout(self.timeout);

        let timeout = self.timeout;
        let fetch = async {
            let mut stream = self.inner.fetch_x509svid(request).await?.into_inner();
            stream
                .message()
                .await?
                .ok_or_else(|| anyhow!("Workload API closed the stream without a response"))
        };

        tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| anyhow!("Workload API did not answer within {:?}", timeout))?
    }
}
