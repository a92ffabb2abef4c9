//! Agent configuration

use anyhow::{Context, Result};
use attestor_lib::directory::{DirectoryConfig, DEFAULT_KUBELET_PORT, NODE_NAME_ENV};
use attestor_lib::runtime::DEFAULT_RUNTIME_ENDPOINT;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "ATTESTOR";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Workload API socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Trust domain for issued SPIFFE IDs
    #[serde(default = "default_trust_domain")]
    pub trust_domain: String,

    /// Node name from Kubernetes downward API; also the kubelet host
    #[serde(default = "default_node_name")]
    pub node_name: String,

    #[serde(default = "default_kubelet_port")]
    pub kubelet_port: u16,

    /// HTTPS with bearer token when true, plain HTTP to localhost otherwise
    #[serde(default = "default_true")]
    pub kubelet_secure: bool,

    /// Service account token; defaults under the sandbox mount point
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// Kubelet CA bundle; defaults under the sandbox mount point
    #[serde(default)]
    pub kubelet_ca_path: Option<PathBuf>,

    #[serde(default)]
    pub skip_kubelet_verification: bool,

    /// CRI socket of the container runtime
    #[serde(default = "default_runtime_endpoint")]
    pub runtime_endpoint: PathBuf,

    /// Deadline for one attestation, in milliseconds
    #[serde(default = "default_attestation_timeout_ms")]
    pub attestation_timeout_ms: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/tmp/spire-agent/public/api.sock")
}

fn default_trust_domain() -> String {
    "example.org".to_string()
}

fn default_node_name() -> String {
    std::env::var(NODE_NAME_ENV).unwrap_or_default()
}

fn default_kubelet_port() -> u16 {
    DEFAULT_KUBELET_PORT
}

fn default_true() -> bool {
    true
}

fn default_runtime_endpoint() -> PathBuf {
    PathBuf::from(DEFAULT_RUNTIME_ENDPOINT)
}

fn default_attestation_timeout_ms() -> u64 {
    2000
}

fn default_api_port() -> u16 {
    8080
}

impl AgentConfig {
    /// Load configuration from `ATTESTOR_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX))
    }

    #[cfg(test)]
    fn from_map(vars: std::collections::HashMap<String, String>) -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_millis(self.attestation_timeout_ms)
    }

    pub fn directory_config(&self) -> DirectoryConfig {
        DirectoryConfig {
            secure: self.kubelet_secure,
            port: self.kubelet_port,
            node_name: self.node_name.clone(),
            token_path: self.token_path.clone(),
            kubelet_ca_path: self.kubelet_ca_path.clone(),
            skip_kubelet_verification: self.skip_kubelet_verification,
            timeout: self.attestation_timeout(),
        }
    }
}
