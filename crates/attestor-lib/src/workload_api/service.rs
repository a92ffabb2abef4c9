//! `FetchX509SVID` handler and server bootstrap

use crate::error::AttestationError;
use crate::identity::IdentityMapper;
use crate::observability::StructuredLogger;
use crate::pipeline::Attestor;
use crate::proto::workload::{
    SpiffeWorkloadApi, SpiffeWorkloadApiServer, X509svid, X509svidRequest, X509svidResponse,
    SECURITY_HEADER,
};
use crate::transport::{attested_incoming, PipeAuthInfo, TransportCredentials};
use anyhow::{Context, Result};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnixListenerStream};
use tonic::metadata::MetadataMap;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

/// Workload API backed by the attestation pipeline
#[derive(Clone)]
pub struct WorkloadApiService {
    attestor: Arc<Attestor>,
    mapper: Arc<dyn IdentityMapper>,
    logger: StructuredLogger,
}

impl WorkloadApiService {
    pub fn new(
        attestor: Arc<Attestor>,
        mapper: Arc<dyn IdentityMapper>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            attestor,
            mapper,
            logger,
        }
    }

    async fn respond(&self, auth: &PipeAuthInfo) -> Result<X509svidResponse, Status> {
        let outcome = async {
            let attestation = self.attestor.attest(auth).await?;
            let spiffe_id = self.mapper.spiffe_id(&attestation)?;
            Ok::<_, AttestationError>((attestation, spiffe_id))
        }
        .await;

        match outcome {
            Ok((attestation, spiffe_id)) => {
                self.logger.log_attestation_succeeded(
                    attestation.process_id,
                    &attestation.container.container_id,
                    &spiffe_id,
                    attestation.selectors.len(),
                );
                Ok(X509svidResponse {
                    svids: vec![X509svid {
                        spiffe_id,
                        hint: attestation.selectors.to_string(),
                        ..Default::default()
                    }],
                    crl: Vec::new(),
                })
            }
            Err(e) => {
                self.logger.log_attestation_failed(&e);
                Err(e.into())
            }
        }
    }
}

fn require_security_header(metadata: &MetadataMap) -> Result<(), Status> {
    match metadata.get(SECURITY_HEADER).and_then(|v| v.to_str().ok()) {
        Some("true") => Ok(()),
        _ => Err(Status::invalid_argument("security header missing from request")),
    }
}

#[tonic::async_trait]
impl SpiffeWorkloadApi for WorkloadApiService {
    type FetchX509SVIDStream = ReceiverStream<Result<X509svidResponse, Status>>;

    async fn fetch_x509svid(
        &self,
        request: Request<X509svidRequest>,
    ) -> Result<Response<Self::FetchX509SVIDStream>, Status> {
        require_security_header(request.metadata())?;

        let auth = request
            .extensions()
            .get::<PipeAuthInfo>()
            .cloned()
            .ok_or_else(|| Status::internal("could not get peer info from connection"))?;

        // Attest before handing back the stream so the per-connection limit
        // covers the pipeline run. Dropping this future cancels the work.
        let response = self.respond(&auth).await?;

        let (tx, rx) = mpsc::channel(1);
        if tx.try_send(Ok(response)).is_err() {
            debug!("Response channel closed before the response was queued");
        }

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Bind the Workload API socket, replacing a stale one left by a previous run
pub fn bind_socket(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    if socket_path.exists() {
        std::fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove stale socket {}", socket_path.display()))?;
    }

    UnixListener::bind(socket_path)
        .with_context(|| format!("Failed to bind {}", socket_path.display()))
}

/// Serve the Workload API until `shutdown` resolves.
///
/// Every accepted connection goes through the local channel handshake before
/// tonic sees it.
pub async fn serve<F>(listener: UnixListener, service: WorkloadApiService, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let credentials = TransportCredentials::new();
    info!(
        security_protocol = %credentials.info().security_protocol,
        "Serving Workload API"
    );

    let incoming = attested_incoming(UnixListenerStream::new(listener), credentials);

    Server::builder()
        .concurrency_limit_per_connection(1)
        .add_service(SpiffeWorkloadApiServer::new(service))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await
        .context("Workload API server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ServiceAccountIdentityMapper;
    use crate::testing::{
        auth_info, web_pod, FixedPeer, OneContainer, SlowDirectory, StaticDirectory,
    };
    use crate::workload_api::WorkloadApiClient;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::oneshot;
    use tonic::Code;

    fn service(pid: u32) -> WorkloadApiService {
        service_with_directory(pid, Arc::new(StaticDirectory::new(vec![web_pod()])))
    }

    fn service_with_directory(
        pid: u32,
        directory: Arc<dyn crate::directory::WorkloadDirectory>,
    ) -> WorkloadApiService {
        let attestor = Attestor::new(
            Arc::new(FixedPeer(Some(pid))),
            Arc::new(OneContainer::running("abc123", 4242)),
            directory,
        );
        WorkloadApiService::new(
            Arc::new(attestor),
            Arc::new(ServiceAccountIdentityMapper::new("example.org").unwrap()),
            StructuredLogger::new("test-node"),
        )
    }

    fn request_with_header() -> Request<X509svidRequest> {
        let mut request = Request::new(X509svidRequest {});
        request
            .metadata_mut()
            .insert(SECURITY_HEADER, "true".parse().unwrap());
        request
    }

    #[tokio::test]
    async fn test_missing_security_header_is_rejected() {
        let err = service(4242)
            .fetch_x509svid(Request::new(X509svidRequest {}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_missing_peer_info_is_internal() {
        let err = service(4242)
            .fetch_x509svid(request_with_header())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_stream_yields_identity() {
        let mut request = request_with_header();
        request.extensions_mut().insert(auth_info());

        let response = service(4242).fetch_x509svid(request).await.unwrap();
        let mut stream = response.into_inner();
        let first = tokio_stream::StreamExt::next(&mut stream)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.svids.len(), 1);
        assert_eq!(first.svids[0].spiffe_id, "spiffe://example.org/ns/ns1/sa/svc1");
        assert!(first.svids[0].hint.contains("pod-name:web"));
        assert!(first.svids[0].x509_svid.is_empty());
    }

    async fn start(service: WorkloadApiService) -> (TempDir, oneshot::Sender<()>) {
        let dir = TempDir::new().unwrap();
        let listener = bind_socket(&dir.path().join("api.sock")).unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, service, async {
            let _ = stopped.await;
        }));
        (dir, stop)
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let (dir, _stop) = start(service(4242)).await;

        let mut client = WorkloadApiClient::connect(dir.path().join("api.sock"), Duration::from_secs(2))
            .await
            .unwrap();
        let response = client.fetch_x509svid().await.unwrap();
        assert_eq!(
            response.svids[0].spiffe_id,
            "spiffe://example.org/ns/ns1/sa/svc1"
        );
    }

    #[tokio::test]
    async fn test_unmanaged_caller_is_denied_over_socket() {
        let (dir, _stop) = start(service(1)).await;

        let mut client = WorkloadApiClient::connect(dir.path().join("api.sock"), Duration::from_secs(2))
            .await
            .unwrap();
        let err = client.fetch_x509svid().await.unwrap_err();
        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.code(), Code::PermissionDenied);
    }

    #[tokio::test]
    async fn test_requests_on_one_connection_are_serialized() {
        let delay = Duration::from_millis(300);
        let directory = Arc::new(SlowDirectory::new(vec![web_pod()], delay));
        let (dir, _stop) = start(service_with_directory(4242, directory)).await;

        let client = WorkloadApiClient::connect(dir.path().join("api.sock"), Duration::from_secs(5))
            .await
            .unwrap();
        let (mut first, mut second) = (client.clone(), client);

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(first.fetch_x509svid(), second.fetch_x509svid());

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(started.elapsed() >= delay * 2);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("api.sock");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        bind_socket(&path).unwrap();
        assert!(path.exists());
    }
}
