//! Connection options shared by the local attestation commands

use attestor_lib::directory::{DirectoryConfig, DEFAULT_KUBELET_PORT};
use attestor_lib::runtime::{CriRuntime, DEFAULT_RUNTIME_ENDPOINT};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/spire-agent/public/api.sock";

/// Container runtime connection
#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    /// CRI socket of the container runtime
    #[arg(long, env = "ATTESTOR_RUNTIME_ENDPOINT", default_value = DEFAULT_RUNTIME_ENDPOINT)]
    pub runtime_endpoint: PathBuf,
}

impl RuntimeArgs {
    pub fn runtime(&self, timeout: Duration) -> CriRuntime {
        CriRuntime::new(&self.runtime_endpoint, timeout)
    }
}

/// Kubelet connection
#[derive(Debug, Clone, Args)]
pub struct DirectoryArgs {
    /// Kubelet host; defaults to 127.0.0.1
    #[arg(long, env = "MY_NODE_NAME", default_value = "")]
    pub node_name: String,

    #[arg(long, env = "ATTESTOR_KUBELET_PORT", default_value_t = DEFAULT_KUBELET_PORT)]
    pub kubelet_port: u16,

    /// Talk plain HTTP to the kubelet on localhost, without a token
    #[arg(long)]
    pub kubelet_insecure: bool,

    /// Service account token file
    #[arg(long, env = "ATTESTOR_TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// CA bundle for the kubelet serving certificate
    #[arg(long, env = "ATTESTOR_KUBELET_CA_PATH")]
    pub kubelet_ca_path: Option<PathBuf>,

    /// Do not verify the kubelet serving certificate
    #[arg(long)]
    pub skip_kubelet_verification: bool,
}

impl DirectoryArgs {
    pub fn directory_config(&self, timeout: Duration) -> DirectoryConfig {
        DirectoryConfig {
            secure: !self.kubelet_insecure,
            port: self.kubelet_port,
            node_name: self.node_name.clone(),
            token_path: self.token_path.clone(),
            kubelet_ca_path: self.kubelet_ca_path.clone(),
            skip_kubelet_verification: self.skip_kubelet_verification,
            timeout,
        }
    }
}
