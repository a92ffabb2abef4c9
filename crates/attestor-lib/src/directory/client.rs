//! Kubelet HTTP(S) client

use super::WorkloadDirectory;
use crate::error::{AttestationError, Result, BODY_PREFIX_LIMIT};
use crate::models::{Pod, PodList};
use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_KUBELET_PORT: u16 = 10250;
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
pub const DEFAULT_KUBELET_CA_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";
pub const NODE_NAME_ENV: &str = "MY_NODE_NAME";
/// Prefix for default secret paths when running inside a host-process sandbox
pub const CONTAINER_MOUNT_POINT_ENV: &str = "CONTAINER_SANDBOX_MOUNT_POINT";

/// Configuration for reaching the kubelet
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// HTTPS with bearer token; when false, plain HTTP to localhost
    pub secure: bool,
    pub port: u16,
    /// Kubelet host; empty means `127.0.0.1`
    pub node_name: String,
    /// Defaults to the service account token under the sandbox mount point
    pub token_path: Option<PathBuf>,
    /// Defaults to the service account CA under the sandbox mount point
    pub kubelet_ca_path: Option<PathBuf>,
    /// Disable certificate chain verification. Unsafe; for constrained
    /// environments only.
    pub skip_kubelet_verification: bool,
    pub timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            secure: true,
            port: DEFAULT_KUBELET_PORT,
            node_name: std::env::var(NODE_NAME_ENV).unwrap_or_default(),
            token_path: None,
            kubelet_ca_path: None,
            skip_kubelet_verification: false,
            timeout: Duration::from_secs(2),
        }
    }
}

impl DirectoryConfig {
    fn resolved_token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| under_mount_point(DEFAULT_TOKEN_PATH))
    }

    fn resolved_ca_path(&self) -> PathBuf {
        self.kubelet_ca_path
            .clone()
            .unwrap_or_else(|| under_mount_point(DEFAULT_KUBELET_CA_PATH))
    }
}

fn under_mount_point(path: &str) -> PathBuf {
    let mount_point = std::env::var(CONTAINER_MOUNT_POINT_ENV).unwrap_or_default();
    PathBuf::from(format!("{mount_point}{path}"))
}

fn load_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| {
        AttestationError::Configuration(format!(
            "unable to load token from {}: {e}",
            path.display()
        ))
    })?;
    Ok(token.trim().to_string())
}

fn load_kubelet_ca(path: &Path) -> Result<Vec<Certificate>> {
    let file = std::fs::File::open(path).map_err(|e| {
        AttestationError::Configuration(format!(
            "unable to load kubelet CA from {}: {e}",
            path.display()
        ))
    })?;

    let ders = rustls_pemfile::certs(&mut BufReader::new(file)).map_err(|e| {
        AttestationError::Configuration(format!("unable to parse kubelet CA: {e}"))
    })?;
    if ders.is_empty() {
        return Err(AttestationError::Configuration(format!(
            "no certificates found in kubelet CA {}",
            path.display()
        )));
    }

    ders.iter()
        .map(|der| {
            Certificate::from_der(der).map_err(|e| {
                AttestationError::Configuration(format!("unable to parse kubelet CA: {e}"))
            })
        })
        .collect()
}

/// Client for the kubelet `/pods` endpoint.
///
/// Token and TLS settings are fixed at construction and shared read-only by
/// all concurrent requests.
#[derive(Clone)]
pub struct KubeletClient {
    client: Client,
    pods_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for KubeletClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeletClient")
            .field("pods_url", &self.pods_url.as_str())
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl KubeletClient {
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let builder = Client::builder().timeout(config.timeout);

        if !config.secure {
            let client = builder.build().map_err(|e| {
                AttestationError::Configuration(format!("failed to create HTTP client: {e}"))
            })?;
            let base = format!("http://127.0.0.1:{}", config.port);
            return Self::with_client(client, &base, None);
        }

        let builder = if config.skip_kubelet_verification {
            warn!("Kubelet certificate verification is disabled");
            builder.danger_accept_invalid_certs(true)
        } else {
            load_kubelet_ca(&config.resolved_ca_path())?
                .into_iter()
                .fold(builder.tls_built_in_root_certs(false), |b, cert| {
                    b.add_root_certificate(cert)
                })
        };

        let client = builder.build().map_err(|e| {
            AttestationError::Configuration(format!("failed to create HTTPS client: {e}"))
        })?;

        let token = load_token(&config.resolved_token_path())?;
        let host = if config.node_name.is_empty() {
            "127.0.0.1"
        } else {
            config.node_name.as_str()
        };

        Self::with_client(client, &format!("https://{}:{}", host, config.port), Some(token))
    }

    /// Build from an existing HTTP client and base URL
    pub fn with_client(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let pods_url = Url::parse(base_url)
            .and_then(|base| base.join("/pods"))
            .map_err(|e| {
                AttestationError::Configuration(format!("invalid kubelet URL {base_url}: {e}"))
            })?;

        Ok(Self {
            client,
            pods_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn pods_url(&self) -> &Url {
        &self.pods_url
    }

    fn decode(body: &[u8]) -> Result<Vec<Pod>> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AttestationError::DirectoryDecodeFailed(e.to_string()))?;

        let pods = if value.is_array() {
            serde_json::from_value::<Vec<Pod>>(value)
        } else {
            serde_json::from_value::<PodList>(value).map(|list| list.items)
        };
        pods.map_err(|e| AttestationError::DirectoryDecodeFailed(e.to_string()))
    }
}

#[async_trait]
impl WorkloadDirectory for KubeletClient {
    async fn list_workloads(&self) -> Result<Vec<Pod>> {
        let mut request = self.client.get(self.pods_url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| AttestationError::DirectoryUnreachable(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let mut prefix = Vec::new();
            while prefix.len() < BODY_PREFIX_LIMIT {
                match response.chunk().await {
                    Ok(Some(chunk)) => prefix.extend_from_slice(&chunk),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "Failed to read error response body");
                        break;
                    }
                }
            }
            return Err(AttestationError::bad_status(status.as_u16(), &prefix));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttestationError::DirectoryUnreachable(e.to_string()))?;

        let pods = Self::decode(&body)?;
        debug!(count = pods.len(), url = %self.pods_url, "Listed pods from kubelet");
        Ok(pods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const POD_LIST: &str = r#"{
        "kind": "PodList",
        "apiVersion": "v1",
        "metadata": {},
        "items": [{
            "metadata": {"name": "web", "namespace": "ns1", "uid": "u-1"},
            "spec": {"nodeName": "node-a", "serviceAccountName": "svc1"},
            "status": {"containerStatuses": [{
                "name": "app",
                "containerID": "containerd://abc123",
                "image": "img:v1",
                "imageID": "img@sha256:deadbeef"
            }]}
        }]
    }"#;

    fn insecure_client(server: &mockito::Server) -> KubeletClient {
        let port = server
            .host_with_port()
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap();
        KubeletClient::new(&DirectoryConfig {
            secure: false,
            port,
            ..DirectoryConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_lists_pods() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pods")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(POD_LIST)
            .create_async()
            .await;

        let pods = insecure_client(&server).list_workloads().await.unwrap();
        mock.assert_async().await;
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].metadata.namespace, "ns1");
    }

    #[tokio::test]
    async fn test_accepts_bare_array() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pods")
            .with_status(200)
            .with_body(r#"[{"metadata": {"name": "a"}}, {"metadata": {"name": "b"}}]"#)
            .create_async()
            .await;

        let pods = insecure_client(&server).list_workloads().await.unwrap();
        let names: Vec<_> = pods.iter().map(|p| p.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pods")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_body(r#"{"items": []}"#)
            .create_async()
            .await;

        let client = KubeletClient::with_client(
            Client::new(),
            &server.url(),
            Some("secret-token".to_string()),
        )
        .unwrap();

        let pods = client.list_workloads().await.unwrap();
        mock.assert_async().await;
        assert!(pods.is_empty());
    }

    #[tokio::test]
    async fn test_bad_status_carries_code_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pods")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let err = insecure_client(&server).list_workloads().await.unwrap_err();
        match err {
            AttestationError::DirectoryBadStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_status_reads_only_body_prefix() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            // Promise far more body than is ever sent, then stall
            socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 10000000\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&[b'x'; 4096]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client =
            KubeletClient::with_client(Client::new(), &format!("http://{addr}"), None).unwrap();
        let err = tokio::time::timeout(Duration::from_secs(5), client.list_workloads())
            .await
            .expect("error body must not be read to the end")
            .unwrap_err();

        match err {
            AttestationError::DirectoryBadStatus { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), BODY_PREFIX_LIMIT);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pods")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = insecure_client(&server).list_workloads().await.unwrap_err();
        assert!(matches!(err, AttestationError::DirectoryDecodeFailed(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = KubeletClient::new(&DirectoryConfig {
            secure: false,
            port,
            ..DirectoryConfig::default()
        })
        .unwrap();

        let err = client.list_workloads().await.unwrap_err();
        assert!(matches!(err, AttestationError::DirectoryUnreachable(_)));
    }

    #[test]
    fn test_secure_client_uses_node_name_and_trimmed_token() {
        let mut token = NamedTempFile::new().unwrap();
        writeln!(token, "  my-token  ").unwrap();

        let client = KubeletClient::new(&DirectoryConfig {
            node_name: "node-a".to_string(),
            token_path: Some(token.path().to_path_buf()),
            skip_kubelet_verification: true,
            ..DirectoryConfig::default()
        })
        .unwrap();

        assert_eq!(client.pods_url().as_str(), "https://node-a:10250/pods");
        assert_eq!(client.token.as_deref(), Some("my-token"));
    }

    #[test]
    fn test_secure_client_defaults_to_localhost() {
        let token = NamedTempFile::new().unwrap();
        std::fs::write(token.path(), "tok").unwrap();

        let client = KubeletClient::new(&DirectoryConfig {
            node_name: String::new(),
            token_path: Some(token.path().to_path_buf()),
            skip_kubelet_verification: true,
            ..DirectoryConfig::default()
        })
        .unwrap();

        assert_eq!(client.pods_url().as_str(), "https://127.0.0.1:10250/pods");
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = KubeletClient::new(&DirectoryConfig {
            token_path: Some(dir.path().join("missing")),
            skip_kubelet_verification: true,
            ..DirectoryConfig::default()
        })
        .unwrap_err();

        assert!(matches!(err, AttestationError::Configuration(_)));
    }

    #[test]
    fn test_unparsable_ca_is_configuration_error() {
        let token = NamedTempFile::new().unwrap();
        std::fs::write(token.path(), "tok").unwrap();
        let ca = NamedTempFile::new().unwrap();
        std::fs::write(ca.path(), "not a certificate").unwrap();

        let err = KubeletClient::new(&DirectoryConfig {
            token_path: Some(token.path().to_path_buf()),
            kubelet_ca_path: Some(ca.path().to_path_buf()),
            ..DirectoryConfig::default()
        })
        .unwrap_err();

        assert!(matches!(err, AttestationError::Configuration(_)));
    }

    const TRUSTED_CA: &str = include_str!("testdata/trusted-ca.pem");
    const KUBELET_CERT: &str = include_str!("testdata/kubelet.pem");
    const KUBELET_KEY: &str = include_str!("testdata/kubelet-key.pem");

    fn pem_file(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    /// Serve TLS on loopback with a certificate the trusted CA did not issue
    async fn untrusted_kubelet() -> u16 {
        let certs = rustls_pemfile::certs(&mut KUBELET_CERT.as_bytes())
            .unwrap()
            .into_iter()
            .map(rustls::Certificate)
            .collect();
        let key = rustls_pemfile::pkcs8_private_keys(&mut KUBELET_KEY.as_bytes())
            .unwrap()
            .remove(0);
        let config = rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certs, rustls::PrivateKey(key))
            .unwrap();
        let acceptor = tokio_rustls::TlsAcceptor::from(std::sync::Arc::new(config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let _ = acceptor.accept(socket).await;
            }
        });
        port
    }

    #[test]
    fn test_secure_client_trusts_configured_ca() {
        let token = pem_file("tok");
        let ca = pem_file(TRUSTED_CA);

        let client = KubeletClient::new(&DirectoryConfig {
            node_name: "node-a".to_string(),
            token_path: Some(token.path().to_path_buf()),
            kubelet_ca_path: Some(ca.path().to_path_buf()),
            ..DirectoryConfig::default()
        })
        .unwrap();

        assert_eq!(client.pods_url().as_str(), "https://node-a:10250/pods");
        assert_eq!(client.token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_kubelet_signed_by_other_ca_is_unreachable() {
        let port = untrusted_kubelet().await;
        let token = pem_file("tok");
        let ca = pem_file(TRUSTED_CA);

        let client = KubeletClient::new(&DirectoryConfig {
            port,
            node_name: "127.0.0.1".to_string(),
            token_path: Some(token.path().to_path_buf()),
            kubelet_ca_path: Some(ca.path().to_path_buf()),
            ..DirectoryConfig::default()
        })
        .unwrap();

        let err = client.list_workloads().await.unwrap_err();
        assert!(matches!(err, AttestationError::DirectoryUnreachable(_)));
    }
}
