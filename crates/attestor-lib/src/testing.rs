//! In-memory stand-ins for the node-local dependencies

use crate::directory::WorkloadDirectory;
use crate::error::{AttestationError, Result};
use crate::models::{ContainerStatus, ObjectMeta, Pod, PodSpec, PodStatus};
use crate::runtime::{ContainerRuntime, RuntimeContainer, RUNTIME_INFO_KEY};
use crate::transport::{PeerHandle, PeerIdentitySource, PipeAuthInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Reports a fixed pid for every peer, or fails when `None`
pub struct FixedPeer(pub Option<u32>);

impl PeerIdentitySource for FixedPeer {
    fn extract_process_id(&self, _handle: &PeerHandle) -> Result<u32> {
        self.0.ok_or(AttestationError::TransportQueryFailed {
            code: Some(9),
            message: "bad handle".into(),
        })
    }
}

/// Runtime holding a single container with the given main pid
pub struct OneContainer {
    pub id: &'static str,
    pub pid: u32,
    pub available: bool,
}

impl OneContainer {
    pub fn running(id: &'static str, pid: u32) -> Self {
        Self {
            id,
            pid,
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            id: "",
            pid: 0,
            available: false,
        }
    }
}

#[async_trait]
impl ContainerRuntime for OneContainer {
    async fn list_containers(&self) -> Result<Vec<RuntimeContainer>> {
        if !self.available {
            return Err(AttestationError::RuntimeUnavailable(
                "connection refused".into(),
            ));
        }
        Ok(vec![RuntimeContainer {
            id: self.id.to_string(),
            pod_sandbox_id: "sandbox-1".into(),
            name: "app".into(),
        }])
    }

    async fn container_info(&self, _container_id: &str) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([(
            RUNTIME_INFO_KEY.to_string(),
            format!(r#"{{"sandboxID":"sandbox-1","pid":{}}}"#, self.pid),
        )]))
    }
}

/// Directory serving a fixed pod listing and counting calls
#[derive(Default)]
pub struct StaticDirectory {
    pub pods: Vec<Pod>,
    pub calls: AtomicUsize,
}

impl StaticDirectory {
    pub fn new(pods: Vec<Pod>) -> Self {
        Self {
            pods,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkloadDirectory for StaticDirectory {
    async fn list_workloads(&self) -> Result<Vec<Pod>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pods.clone())
    }
}

/// Directory that takes `delay` to answer each listing
pub struct SlowDirectory {
    pub pods: Vec<Pod>,
    pub delay: Duration,
}

impl SlowDirectory {
    pub fn new(pods: Vec<Pod>, delay: Duration) -> Self {
        Self { pods, delay }
    }
}

#[async_trait]
impl WorkloadDirectory for SlowDirectory {
    async fn list_workloads(&self) -> Result<Vec<Pod>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.pods.clone())
    }
}

/// Pod `ns1/web` running `containerd://abc123` as service account `svc1`
pub fn web_pod() -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: "web".into(),
            namespace: "ns1".into(),
            uid: "u-1".into(),
            ..Default::default()
        },
        spec: PodSpec {
            node_name: "node-a".into(),
            service_account_name: "svc1".into(),
        },
        status: PodStatus {
            container_statuses: vec![ContainerStatus {
                name: "app".into(),
                container_id: "containerd://abc123".into(),
                image: "img:v1".into(),
                image_id: "img@sha256:deadbeef".into(),
            }],
            ..Default::default()
        },
    }
}

/// Auth info over a throwaway socket pair
pub fn auth_info() -> PipeAuthInfo {
    let (local, _remote) = UnixStream::pair().expect("socketpair");
    PipeAuthInfo::new(PeerHandle::duplicate(local.as_fd()).expect("dup"))
}
